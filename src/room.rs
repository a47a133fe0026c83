use std::collections::{HashMap, hash_map};
use std::fmt;

use itertools::Itertools;
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RelayRejection;
use crate::game::GameState;
use crate::server::ClientId;


#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(s: impl Into<String>) -> Self { RoomId(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        RoomId(rng.random_range(1000..10000).to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}


// A two-seat room. The host slot is always occupied; a room that loses its last member is
// removed from the registry together with its game.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    host: ClientId,
    guest: Option<ClientId>,
    game: Option<GameState>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LeaveOutcome {
    NotMember,
    // Somebody is still in the room. `promoted` is set if the host left and `remaining` has
    // taken over.
    Left { remaining: ClientId, promoted: bool },
    RoomClosed,
}

impl Room {
    fn new(id: RoomId, host: ClientId) -> Self { Room { id, host, guest: None, game: None } }

    pub fn host(&self) -> ClientId { self.host }
    pub fn guest(&self) -> Option<ClientId> { self.guest }
    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        std::iter::once(self.host).chain(self.guest)
    }
    pub fn num_members(&self) -> usize { 1 + usize::from(self.guest.is_some()) }
    pub fn is_full(&self) -> bool { self.guest.is_some() }
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.host == client_id || self.guest == Some(client_id)
    }
    pub fn others(&self, client_id: ClientId) -> impl Iterator<Item = ClientId> + '_ {
        self.members().filter(move |&id| id != client_id)
    }

    pub fn game_mut(&mut self) -> Option<&mut GameState> { self.game.as_mut() }
    pub fn set_game(&mut self, game: GameState) { self.game = Some(game); }

    // Returns `None` if the room became empty.
    fn remove_member(&mut self, client_id: ClientId) -> Option<LeaveOutcome> {
        if self.guest == Some(client_id) {
            self.guest = None;
            Some(LeaveOutcome::Left { remaining: self.host, promoted: false })
        } else {
            assert_eq!(self.host, client_id);
            let new_host = self.guest.take()?;
            self.host = new_host;
            Some(LeaveOutcome::Left { remaining: new_host, promoted: true })
        }
    }
}


// Owns all rooms and, through them, all per-game state.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self { RoomRegistry { rooms: HashMap::new() } }

    pub fn len(&self) -> usize { self.rooms.len() }
    pub fn is_empty(&self) -> bool { self.rooms.is_empty() }
    pub fn get(&self, id: &RoomId) -> Option<&Room> { self.rooms.get(id) }

    // Looks up a room on behalf of one of its members.
    pub fn member_room_mut(
        &mut self, id: &RoomId, client_id: ClientId,
    ) -> Result<&mut Room, RelayRejection> {
        let room = self
            .rooms
            .get_mut(id)
            .ok_or_else(|| RelayRejection::NoSuchRoom { room: id.clone() })?;
        if !room.contains(client_id) {
            return Err(RelayRejection::NotInRoom { room: id.clone() });
        }
        Ok(room)
    }

    pub fn create_room<R: Rng + ?Sized>(&mut self, host: ClientId, rng: &mut R) -> RoomId {
        loop {
            let id = RoomId::random(rng);
            if let hash_map::Entry::Vacant(e) = self.rooms.entry(id.clone()) {
                e.insert(Room::new(id.clone(), host));
                info!("Room {} created by client {:?}", id, host);
                return id;
            }
        }
    }

    // A full room rejects everybody, its own guest included. The host of a room that is still
    // waiting for a guest is already in it, so their join is a no-op.
    pub fn join_room(&mut self, id: &RoomId, client_id: ClientId) -> Result<&Room, RelayRejection> {
        let room = self
            .rooms
            .get_mut(id)
            .ok_or_else(|| RelayRejection::NoSuchRoom { room: id.clone() })?;
        if room.is_full() {
            return Err(RelayRejection::RoomFull { room: id.clone() });
        }
        if room.host != client_id {
            room.guest = Some(client_id);
            info!("Client {:?} joined room {}", client_id, id);
        }
        Ok(room)
    }

    pub fn leave_room(&mut self, id: &RoomId, client_id: ClientId) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(id) else {
            return LeaveOutcome::NotMember;
        };
        if !room.contains(client_id) {
            return LeaveOutcome::NotMember;
        }
        info!("Client {:?} left room {}", client_id, id);
        match room.remove_member(client_id) {
            Some(outcome) => outcome,
            None => {
                self.close_room(id);
                LeaveOutcome::RoomClosed
            }
        }
    }

    pub fn rooms_of(&self, client_id: ClientId) -> Vec<RoomId> {
        self.rooms
            .values()
            .filter(|room| room.contains(client_id))
            .map(|room| room.id.clone())
            .sorted()
            .collect()
    }

    // Removes the room and everything derived from it (clock, dice) in one step.
    fn close_room(&mut self, id: &RoomId) {
        if let Some(room) = self.rooms.remove(id) {
            info!("Room {} closed (game started: {})", id, room.game.is_some());
        }
    }
}
