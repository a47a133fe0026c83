// Rust-upgrade (https://github.com/rust-lang/rust/issues/46379):
//   remove `#[allow(dead_code)]` before public functions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dice_chess_relay::event::RelayServerEvent;
use dice_chess_relay::server::{self, ClientId, IncomingEvent, ServerOptions};
use dice_chess_relay::test_util::deterministic_rng;
use dice_chess_relay::utc_time::UtcDateTime;
use instant::Instant;
use serde_json::Value;


// 2023-11-14 22:13:20 UTC.
pub const T0_UNIX_MS: u64 = 1_700_000_000_000;

// Drives `ServerState` directly with a mock clock: both the monotonic and the wall clock
// advance only through `set_time`.
pub struct TestServer {
    creation_instant: Instant,
    time_elapsed: Duration,
    clients: Arc<Mutex<server::Clients>>,
    state: server::ServerState,
}

impl TestServer {
    #[allow(dead_code)]
    pub fn new() -> Self { Self::with_options(ServerOptions::default()) }

    pub fn with_options(options: ServerOptions) -> Self {
        let clients = Arc::new(Mutex::new(server::Clients::new()));
        let state = server::ServerState::new(
            options,
            Arc::clone(&clients),
            Box::new(deterministic_rng()),
        );
        TestServer {
            creation_instant: Instant::now(),
            time_elapsed: Duration::ZERO,
            clients,
            state,
        }
    }

    #[allow(dead_code)]
    pub fn set_time(&mut self, time: Duration) { self.time_elapsed = time; }
    pub fn current_instant(&self) -> Instant { self.creation_instant + self.time_elapsed }
    pub fn current_utc(&self) -> UtcDateTime {
        UtcDateTime::UNIX_EPOCH + Duration::from_millis(T0_UNIX_MS) + self.time_elapsed
    }

    #[allow(dead_code)]
    pub fn state(&self) -> &server::ServerState { &self.state }

    pub fn connect(&mut self, name: &str) -> TestClient {
        let (events_tx, events_rx) = async_std::channel::unbounded();
        let id = self.clients.lock().unwrap().add_client(events_tx, name.to_owned());
        TestClient { id, name: name.to_owned(), events_rx }
    }

    pub fn send_text(&mut self, client: &TestClient, text: &str) {
        println!("{} >>> {}", client.name, text);
        self.apply(IncomingEvent::Network(client.id, text.to_owned()));
    }

    pub fn send(&mut self, client: &TestClient, message: Value) {
        self.send_text(client, &message.to_string());
    }

    #[allow(dead_code)]
    pub fn disconnect(&mut self, client: &TestClient) {
        println!("{} disconnected", client.name);
        self.apply(IncomingEvent::Disconnect(client.id));
    }

    fn apply(&mut self, event: IncomingEvent) {
        let now = self.current_instant();
        let utc_now = self.current_utc();
        self.state.apply_event(event, now, utc_now);
    }
}


pub struct TestClient {
    pub id: ClientId,
    name: String,
    events_rx: async_std::channel::Receiver<RelayServerEvent>,
}

impl TestClient {
    // Drains all pending events, as they would appear on the wire.
    pub fn received(&self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            let value = serde_json::to_value(&event).unwrap();
            println!("{} <<< {}", self.name, value);
            events.push(value);
        }
        events
    }

    #[allow(dead_code)]
    pub fn received_single(&self) -> Value {
        let mut events = self.received();
        assert_eq!(events.len(), 1, "{}: expected exactly one event, got {:?}", self.name, events);
        events.pop().unwrap()
    }

    #[allow(dead_code)]
    pub fn assert_silent(&self) {
        let events = self.received();
        assert!(events.is_empty(), "{}: unexpected events {:?}", self.name, events);
    }

    // Returns the error message, asserting that it is the only event.
    #[allow(dead_code)]
    pub fn received_error(&self) -> String {
        let event = self.received_single();
        assert_eq!(event["action"], "error", "{}: expected error, got {}", self.name, event);
        event["message"].as_str().unwrap().to_owned()
    }
}
