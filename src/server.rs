use std::collections::{HashMap, hash_map};
use std::ops;
use std::sync::{Arc, Mutex};

use instant::Instant;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use prometheus::{IntCounter, IntGauge, register_int_counter, register_int_gauge};
use rand::RngCore;

use crate::clock::{GAME_START_SYNC_BUFFER, ServerTimestamp, TimeControl};
use crate::dice::{DICE_GAME_MODE, DiceError};
use crate::error::RelayRejection;
use crate::event::{
    ForwardedMessage, GameStartNotice, MoveNotice, MoveRequest, RelayClientEvent, RelayServerEvent,
    StartGameRequest,
};
use crate::game::GameState;
use crate::rate_limit::{RateLimit, RateLimiter};
use crate::room::{LeaveOutcome, RoomId, RoomRegistry};
use crate::utc_time::UtcDateTime;


lazy_static! {
    static ref ACTIVE_ROOMS: IntGauge =
        register_int_gauge!("active_rooms", "Rooms with at least one member.").unwrap();
    static ref CONNECTED_CLIENTS: IntGauge =
        register_int_gauge!("connected_clients", "Open client connections.").unwrap();
    static ref INCOMING_MESSAGES: IntCounter =
        register_int_counter!("incoming_messages", "Messages received from clients.").unwrap();
    static ref RATE_LIMITED_MESSAGES: IntCounter = register_int_counter!(
        "rate_limited_messages",
        "Messages dropped because the sender exceeded the rate limit."
    )
    .unwrap();
    static ref REJECTED_MESSAGES: IntCounter = register_int_counter!(
        "rejected_messages",
        "Messages answered with an error (excluding rate limiting)."
    )
    .unwrap();
}

#[derive(Debug)]
pub enum IncomingEvent {
    // Raw text frame as received from the client.
    Network(ClientId, String),
    Disconnect(ClientId),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub rate_limit: RateLimit,
}


#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClientId(usize);

impl ClientId {
    pub const fn from_raw(id: usize) -> Self { ClientId(id) }
}

pub struct Client {
    events_tx: async_std::channel::Sender<RelayServerEvent>,
    logging_id: String,
}

impl Client {
    // Never blocks. A client that has gone away simply misses the event: its disconnect
    // notification is already on the way.
    pub fn send(&self, event: RelayServerEvent) {
        if self.events_tx.try_send(event).is_err() {
            debug!("Dropping event for client {}", self.logging_id);
        }
    }
    fn send_rejection(&self, rejection: RelayRejection) {
        self.send(RelayServerEvent::Error { message: rejection.to_string() });
    }
}

pub struct Clients {
    map: HashMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self { Clients { map: HashMap::new() } }

    pub fn add_client(
        &mut self, events_tx: async_std::channel::Sender<RelayServerEvent>, logging_id: String,
    ) -> ClientId {
        let client = Client { events_tx, logging_id };
        loop {
            let id = ClientId(rand::random::<u64>() as usize);
            if let hash_map::Entry::Vacant(e) = self.map.entry(id) {
                e.insert(client);
                CONNECTED_CLIENTS.inc();
                return id;
            }
        }
    }

    // Returns client logging id if the client existed.
    pub fn remove_client(&mut self, id: ClientId) -> Option<String> {
        let client = self.map.remove(&id)?;
        CONNECTED_CLIENTS.dec();
        Some(client.logging_id)
    }

    pub fn contains(&self, id: ClientId) -> bool { self.map.contains_key(&id) }

    fn send(&self, id: ClientId, event: RelayServerEvent) {
        if let Some(client) = self.map.get(&id) {
            client.send(event);
        }
    }

    fn send_to_all(&self, ids: impl IntoIterator<Item = ClientId>, event: &RelayServerEvent) {
        for id in ids {
            self.send(id, event.clone());
        }
    }
}

impl ops::Index<ClientId> for Clients {
    type Output = Client;
    fn index(&self, id: ClientId) -> &Self::Output { &self.map[&id] }
}


// The single writer for all room state. Each event is processed to completion before the next
// one, which makes every room transition atomic.
pub struct ServerState {
    clients: Arc<Mutex<Clients>>,
    rooms: RoomRegistry,
    rate_limiter: RateLimiter<ClientId>,
    rng: Box<dyn RngCore + Send>,
}

impl ServerState {
    pub fn new(
        options: ServerOptions, clients: Arc<Mutex<Clients>>, rng: Box<dyn RngCore + Send>,
    ) -> Self {
        ServerState {
            clients,
            rooms: RoomRegistry::new(),
            rate_limiter: RateLimiter::new(options.rate_limit),
            rng,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry { &self.rooms }

    pub fn apply_event(&mut self, event: IncomingEvent, now: Instant, utc_now: UtcDateTime) {
        let clients = Arc::clone(&self.clients);
        let mut clients = clients.lock().unwrap();
        match event {
            IncomingEvent::Network(client_id, text) => {
                self.process_message(&clients, client_id, &text, now, utc_now);
            }
            IncomingEvent::Disconnect(client_id) => {
                self.process_disconnect(&mut clients, client_id);
            }
        }
        ACTIVE_ROOMS.set(self.rooms.len().try_into().unwrap_or(i64::MAX));
    }

    fn process_message(
        &mut self, clients: &Clients, client_id: ClientId, text: &str, now: Instant,
        utc_now: UtcDateTime,
    ) {
        if !clients.contains(client_id) {
            // Disconnect has been processed already.
            return;
        }
        INCOMING_MESSAGES.inc();
        if !self.rate_limiter.admit(client_id, now) {
            RATE_LIMITED_MESSAGES.inc();
            warn!("Client {} exceeded the rate limit", clients[client_id].logging_id);
            clients[client_id].send_rejection(RelayRejection::RateLimited);
            return;
        }
        let result = RelayClientEvent::parse(text).and_then(|event| {
            debug!("Client {:?} >>> {:?}", client_id, event);
            self.process_client_event(clients, client_id, event, utc_now.into())
        });
        if let Err(rejection) = result {
            REJECTED_MESSAGES.inc();
            info!("Rejecting message from client {}: {}", clients[client_id].logging_id, rejection);
            clients[client_id].send_rejection(rejection);
        }
    }

    fn process_disconnect(&mut self, clients: &mut Clients, client_id: ClientId) {
        for room_id in self.rooms.rooms_of(client_id) {
            self.leave_room(clients, client_id, &room_id);
        }
        self.rate_limiter.forget(&client_id);
        if let Some(logging_id) = clients.remove_client(client_id) {
            info!("Client {} disconnected", logging_id);
        }
    }

    fn process_client_event(
        &mut self, clients: &Clients, client_id: ClientId, event: RelayClientEvent,
        now: ServerTimestamp,
    ) -> Result<(), RelayRejection> {
        match event {
            RelayClientEvent::CreateRoom => self.process_create_room(clients, client_id),
            RelayClientEvent::JoinRoom { room } => self.process_join_room(clients, client_id, room),
            RelayClientEvent::StartGame(request) => {
                self.process_start_game(clients, client_id, request, now)
            }
            RelayClientEvent::Move(request) => self.process_move(clients, client_id, request, now),
            RelayClientEvent::RequestDice { room, num_movable_pieces } => {
                self.process_request_dice(clients, client_id, room, num_movable_pieces)
            }
            RelayClientEvent::DiceCheckInterruption { room, saved_moves_remaining } => {
                self.process_check_interruption(clients, client_id, room, saved_moves_remaining)
            }
            RelayClientEvent::DiceCheckResolved { room } => {
                self.process_check_resolved(clients, client_id, room)
            }
            RelayClientEvent::LeaveRoom { room } => {
                self.leave_room(clients, client_id, &room);
                Ok(())
            }
            RelayClientEvent::Surrender(message) => {
                self.forward(clients, client_id, message, RelayServerEvent::Surrender)
            }
            RelayClientEvent::DrawOffer(message) => {
                self.forward(clients, client_id, message, RelayServerEvent::DrawOffer)
            }
            RelayClientEvent::DrawResponse(message) => {
                self.forward(clients, client_id, message, RelayServerEvent::DrawResponse)
            }
            RelayClientEvent::GameOver(message) => {
                self.forward(clients, client_id, message, RelayServerEvent::GameOver)
            }
            RelayClientEvent::Unrecognized => {
                warn!("Ignoring unrecognized action from client {}", clients[client_id].logging_id);
                Ok(())
            }
        }
    }

    fn process_create_room(
        &mut self, clients: &Clients, client_id: ClientId,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.create_room(client_id, &mut *self.rng);
        clients.send(client_id, RelayServerEvent::RoomCreated { room });
        Ok(())
    }

    fn process_join_room(
        &mut self, clients: &Clients, client_id: ClientId, room_id: RoomId,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.join_room(&room_id, client_id)?;
        clients.send(client_id, RelayServerEvent::JoinedRoom { room: room_id.clone() });
        if room.host() != client_id {
            clients.send(room.host(), RelayServerEvent::PlayerJoined { room: room_id });
        }
        Ok(())
    }

    fn process_start_game(
        &mut self, clients: &Clients, client_id: ClientId, request: StartGameRequest,
        now: ServerTimestamp,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&request.room, client_id)?;
        if !room.is_full() {
            return Err(RelayRejection::NotEnoughPlayers { room: request.room });
        }
        let control = TimeControl {
            white_time: request.white_time_ms,
            black_time: request.black_time_ms,
            increment: request.increment_ms,
        };
        let dice_enabled = request.game_modes.get(DICE_GAME_MODE).and_then(|v| v.as_bool()) == Some(true);
        let game = GameState::new(&control, request.host_color, dice_enabled);
        info!(
            "Game started in room {}: host plays {:?}, dice mode {}",
            request.room, request.host_color, dice_enabled
        );
        let notice = GameStartNotice {
            room: request.room,
            white_time_ms: request.white_time_ms,
            black_time_ms: request.black_time_ms,
            increment_ms: request.increment_ms,
            host_color: request.host_color,
            game_modes: request.game_modes,
            mine_positions: request.mine_positions,
            server_timestamp: now + GAME_START_SYNC_BUFFER,
            timer_state: game.timer_state(),
            dice_state: game.dice_state(),
        };
        room.set_game(game);
        clients.send_to_all(room.members(), &RelayServerEvent::GameStart(notice));
        Ok(())
    }

    fn process_move(
        &mut self, clients: &Clients, client_id: ClientId, request: MoveRequest,
        now: ServerTimestamp,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&request.room, client_id)?;
        let check_budget = request.check_budget();
        match room.game_mut() {
            Some(game) => {
                let result = game.apply_move(check_budget, now);
                let notice = MoveNotice {
                    request,
                    timer_state: Some(result.timer_state),
                    dice_state: result.dice_state,
                };
                clients.send_to_all(room.members(), &RelayServerEvent::Move(notice));
            }
            None => {
                // Game was not started through the server: plain relay without clock.
                let notice = MoveNotice { request, timer_state: None, dice_state: None };
                clients.send_to_all(room.others(client_id), &RelayServerEvent::Move(notice));
            }
        }
        Ok(())
    }

    fn process_request_dice(
        &mut self, clients: &Clients, client_id: ClientId, room_id: RoomId,
        num_movable_pieces: u32,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&room_id, client_id)?;
        let roll = room
            .game_mut()
            .and_then(|game| game.roll_dice(&mut *self.rng, num_movable_pieces))
            .ok_or_else(|| RelayRejection::DiceModeDisabled { room: room_id.clone() })?;
        debug!("Dice rolled in room {} for {:?}: {:?}", room_id, roll.current_player, roll.rolls);
        let event = RelayServerEvent::DiceRolled {
            room: room_id,
            rolls: roll.rolls,
            current_player: roll.current_player,
        };
        clients.send_to_all(room.members(), &event);
        Ok(())
    }

    fn process_check_interruption(
        &mut self, clients: &Clients, client_id: ClientId, room_id: RoomId,
        saved_moves_remaining: u8,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&room_id, client_id)?;
        let game = room
            .game_mut()
            .ok_or_else(|| RelayRejection::DiceModeDisabled { room: room_id.clone() })?;
        let current_player = match game.interrupt_for_check(saved_moves_remaining) {
            Ok(Some(current_player)) => current_player,
            Ok(None) => return Err(RelayRejection::DiceModeDisabled { room: room_id }),
            Err(DiceError::InterruptionPending) => {
                return Err(RelayRejection::InterruptionPending { room: room_id });
            }
        };
        let event = RelayServerEvent::DiceCheckInterrupted { room: room_id, current_player };
        clients.send_to_all(room.members(), &event);
        Ok(())
    }

    fn process_check_resolved(
        &mut self, clients: &Clients, client_id: ClientId, room_id: RoomId,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&room_id, client_id)?;
        let game = room
            .game_mut()
            .filter(|game| game.is_dice_game())
            .ok_or_else(|| RelayRejection::DiceModeDisabled { room: room_id.clone() })?;
        // Already resolved, e.g. implicitly by the corrective reply.
        let Some(restored) = game.resolve_check() else {
            return Ok(());
        };
        let event = RelayServerEvent::DiceCheckRestored {
            room: room_id,
            current_player: restored.current_player,
            moves_remaining: restored.moves_remaining,
        };
        clients.send_to_all(room.members(), &event);
        Ok(())
    }

    // Informational messages go to the opponent only.
    fn forward(
        &mut self, clients: &Clients, client_id: ClientId, message: ForwardedMessage,
        make_event: fn(ForwardedMessage) -> RelayServerEvent,
    ) -> Result<(), RelayRejection> {
        let room = self.rooms.member_room_mut(&message.room, client_id)?;
        clients.send_to_all(room.others(client_id), &make_event(message));
        Ok(())
    }

    // No-op if the client is not in the room.
    fn leave_room(&mut self, clients: &Clients, client_id: ClientId, room_id: &RoomId) {
        match self.rooms.leave_room(room_id, client_id) {
            LeaveOutcome::NotMember | LeaveOutcome::RoomClosed => {}
            LeaveOutcome::Left { remaining, promoted } => {
                clients.send(remaining, RelayServerEvent::PlayerLeft { room: room_id.clone() });
                if promoted {
                    clients.send(remaining, RelayServerEvent::PromotedToHost { room: room_id.clone() });
                }
            }
        }
    }
}
