// Improvement potential. Run a subset of these scenarios through a real websocket connection
//   to cover `relay_console` framing as well.

mod common;

use std::time::Duration;

use common::*;
use dice_chess_relay::rate_limit::RateLimit;
use dice_chess_relay::server::ServerOptions;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};


fn room_of(event: &Value) -> String { event["room"].as_str().unwrap().to_owned() }

fn create_room(server: &mut TestServer, host: &TestClient) -> String {
    server.send(host, json!({ "action": "createRoom" }));
    let event = host.received_single();
    assert_eq!(event["action"], "roomCreated");
    room_of(&event)
}

// Host and guest in a fresh room, with all join notifications consumed.
fn two_player_room(server: &mut TestServer) -> (TestClient, TestClient, String) {
    let host = server.connect("host");
    let guest = server.connect("guest");
    let room = create_room(server, &host);
    server.send(&guest, json!({ "action": "joinRoom", "room": room }));
    guest.received();
    host.received();
    (host, guest, room)
}

fn start_game(server: &mut TestServer, host: &TestClient, room: &str, game_modes: Value) {
    server.send(
        host,
        json!({
            "action": "startGame",
            "room": room,
            "whiteTimeMs": 300000,
            "blackTimeMs": 300000,
            "incrementMs": 2000,
            "hostColor": "White",
            "gameModes": game_modes,
        }),
    );
}

fn move_message(room: &str) -> Value {
    json!({
        "action": "move",
        "room": room,
        "fromRow": 6,
        "fromCol": 4,
        "toRow": 4,
        "toCol": 4,
    })
}

fn flagged_move_message(room: &str, saved_dice_moves: u8) -> Value {
    let mut message = move_message(room);
    message["diceCheckInterruption"] = json!(true);
    message["savedDiceMoves"] = json!(saved_dice_moves);
    message
}

fn at_secs(server: &mut TestServer, secs: u64) { server.set_time(Duration::from_secs(secs)); }


#[test]
fn create_and_join_room() {
    let mut server = TestServer::new();
    let host = server.connect("host");
    let guest = server.connect("guest");
    let room = create_room(&mut server, &host);
    assert_eq!(room.len(), 4);
    assert!(room.chars().all(|c| c.is_ascii_digit()));

    server.send(&guest, json!({ "action": "joinRoom", "room": room }));
    assert_eq!(guest.received_single(), json!({ "action": "joinedRoom", "room": room }));
    assert_eq!(host.received_single(), json!({ "action": "playerJoined", "room": room }));
}

#[test]
fn join_errors() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    let third = server.connect("third");

    server.send(&third, json!({ "action": "joinRoom", "room": room }));
    assert!(third.received_error().contains("is full"));

    let missing = if room == "1000" { "1001" } else { "1000" };
    server.send(&third, json!({ "action": "joinRoom", "room": missing }));
    assert!(third.received_error().contains("does not exist"));

    // The guest is turned away like anybody else, and the host hears nothing.
    server.send(&guest, json!({ "action": "joinRoom", "room": room }));
    assert!(guest.received_error().contains("is full"));
    host.assert_silent();
}

#[test]
fn host_rejoining_waiting_room_is_no_op() {
    let mut server = TestServer::new();
    let host = server.connect("host");
    let room = create_room(&mut server, &host);

    server.send(&host, json!({ "action": "joinRoom", "room": room }));
    assert_eq!(host.received_single(), json!({ "action": "joinedRoom", "room": room }));
    host.assert_silent();

    let guest = server.connect("guest");
    server.send(&guest, json!({ "action": "joinRoom", "room": room }));
    assert_eq!(guest.received_single(), json!({ "action": "joinedRoom", "room": room }));
    assert_eq!(host.received_single(), json!({ "action": "playerJoined", "room": room }));
}

#[test]
fn game_start_is_broadcast_with_initial_timer() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({}));
    let expected = json!({
        "action": "gameStart",
        "room": room,
        "whiteTimeMs": 300000,
        "blackTimeMs": 300000,
        "incrementMs": 2000,
        "hostColor": "White",
        "gameModes": {},
        "minePositions": [],
        "serverTimestamp": T0_UNIX_MS + 500,
        "timerState": {
            "timeA": 300000,
            "timeB": 300000,
            "currentPlayer": "White",
            "lastSwitchTime": null,
        },
    });
    assert_eq!(host.received_single(), expected);
    assert_eq!(guest.received_single(), expected);
}

#[test]
fn game_start_requires_two_players() {
    let mut server = TestServer::new();
    let host = server.connect("host");
    let room = create_room(&mut server, &host);
    start_game(&mut server, &host, &room, json!({}));
    assert!(host.received_error().contains("two players"));
}

#[test]
fn first_move_is_free_and_gets_increment() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({}));
    host.received();
    guest.received();

    at_secs(&mut server, 10);
    server.send(&host, move_message(&room));
    let event = guest.received_single();
    assert_eq!(host.received_single(), event);
    assert_eq!(event["action"], "move");
    assert_eq!(event["fromRow"], 6);
    assert_eq!(
        event["timerState"],
        json!({
            "timeA": 302000,
            "timeB": 300000,
            "currentPlayer": "Black",
            "lastSwitchTime": T0_UNIX_MS + 11_000,
        })
    );
    assert!(event.get("diceState").is_none());

    // Black answers 4s later: 3s are charged because of the compensation buffer.
    at_secs(&mut server, 14);
    server.send(&guest, move_message(&room));
    let event = host.received_single();
    guest.received();
    assert_eq!(
        event["timerState"],
        json!({
            "timeA": 302000,
            "timeB": 299000,
            "currentPlayer": "White",
            "lastSwitchTime": T0_UNIX_MS + 15_000,
        })
    );
}

#[test]
fn unknown_move_fields_are_relayed() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({}));
    host.received();
    guest.received();

    let mut message = move_message(&room);
    message["promotion"] = json!("queen");
    message["movedPieceType"] = json!("pawn");
    server.send(&host, message);
    let event = guest.received_single();
    assert_eq!(event["promotion"], "queen");
    assert_eq!(event["movedPieceType"], "pawn");
}

#[test]
fn move_without_game_is_relayed_to_opponent_only() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    server.send(&host, move_message(&room));
    assert_eq!(guest.received_single(), move_message(&room));
    host.assert_silent();

    let mut message = move_message(&room);
    message["movedPieceType"] = Value::Null;
    message["diceCheckInterruption"] = Value::Null;
    message["savedDiceMoves"] = Value::Null;
    server.send(&guest, message.clone());
    assert_eq!(host.received_single(), message);
    guest.assert_silent();
}

#[test]
fn invalid_move_is_rejected() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({}));
    host.received();
    guest.received();

    let mut message = move_message(&room);
    message["toRow"] = json!(8);
    server.send(&host, message);
    assert!(host.received_error().starts_with("Invalid message"));
    guest.assert_silent();

    let mut message = move_message(&room);
    message.as_object_mut().unwrap().remove("fromCol");
    server.send(&host, message);
    assert!(host.received_error().starts_with("Invalid message"));

    // The clock has not been touched: the next valid move is still the free first move.
    at_secs(&mut server, 30);
    server.send(&host, move_message(&room));
    assert_eq!(guest.received_single()["timerState"]["timeA"], 302000);
}

#[test]
fn malformed_json_is_rejected() {
    let mut server = TestServer::new();
    let client = server.connect("client");
    server.send_text(&client, "{ not json");
    assert!(client.received_error().starts_with("Invalid message"));
    server.send_text(&client, r#"{ "room": "1234" }"#);
    assert!(client.received_error().starts_with("Invalid message"));
}

#[test]
fn unrecognized_action_is_ignored() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    server.send(&host, json!({ "action": "chat", "room": room, "text": "hi" }));
    host.assert_silent();
    guest.assert_silent();
}

#[test]
fn room_scoped_actions_require_membership() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    let outsider = server.connect("outsider");
    server.send(&outsider, move_message(&room));
    assert!(outsider.received_error().contains("not in room"));
    server.send(&outsider, json!({ "action": "surrender", "room": room }));
    assert!(outsider.received_error().contains("not in room"));
    host.assert_silent();
    guest.assert_silent();

    // Leaving a room one is not in is a no-op.
    server.send(&outsider, json!({ "action": "leaveRoom", "room": room }));
    outsider.assert_silent();
    host.assert_silent();
}

#[test]
fn informational_messages_go_to_opponent_only() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    for action in ["surrender", "drawOffer", "drawResponse", "gameOver"] {
        let message = json!({ "action": action, "room": room, "accepted": true, "reason": "test" });
        server.send(&guest, message.clone());
        assert_eq!(host.received_single(), message);
        guest.assert_silent();
    }
}

#[test]
fn host_leaving_promotes_guest() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    server.send(&host, json!({ "action": "leaveRoom", "room": room }));
    host.assert_silent();
    assert_eq!(
        guest.received(),
        vec![
            json!({ "action": "playerLeft", "room": room }),
            json!({ "action": "promotedToHost", "room": room }),
        ]
    );

    // The room stays open for a new opponent, who is announced to the new host.
    let newcomer = server.connect("newcomer");
    server.send(&newcomer, json!({ "action": "joinRoom", "room": room }));
    newcomer.received();
    assert_eq!(guest.received_single(), json!({ "action": "playerJoined", "room": room }));
}

#[test]
fn disconnect_cleans_up_rooms() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    let lonely = server.connect("lonely");
    create_room(&mut server, &lonely);
    assert_eq!(server.state().rooms().len(), 2);

    server.disconnect(&lonely);
    assert_eq!(server.state().rooms().len(), 1);

    server.disconnect(&guest);
    assert_eq!(host.received_single(), json!({ "action": "playerLeft", "room": room }));
    server.disconnect(&host);
    assert!(server.state().rooms().is_empty());

    // Messages from a connection that is gone are dropped.
    server.send(&host, json!({ "action": "createRoom" }));
    assert!(server.state().rooms().is_empty());
}

#[test]
fn dice_turn_spans_three_moves() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({ "骰子": true }));
    let start = guest.received_single();
    host.received();
    assert_eq!(start["diceState"], json!({ "currentPlayer": "White", "movesRemaining": 3 }));

    let mut dice_states = vec![];
    for i in 0..3 {
        at_secs(&mut server, 10 + i);
        server.send(&host, move_message(&room));
        let event = guest.received_single();
        host.received();
        dice_states.push((event["timerState"]["currentPlayer"].clone(), event["diceState"].clone()));
    }
    assert_eq!(
        dice_states,
        vec![
            (json!("White"), json!({ "currentPlayer": "White", "movesRemaining": 2 })),
            (json!("White"), json!({ "currentPlayer": "White", "movesRemaining": 1 })),
            (json!("Black"), json!({ "currentPlayer": "Black", "movesRemaining": 3 })),
        ]
    );
}

#[test]
fn dice_mode_requires_flag() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({ "骰子": false, "地雷": true }));
    let start = guest.received_single();
    host.received();
    assert!(start.get("diceState").is_none());

    server.send(&host, json!({ "action": "requestDice", "room": room, "numMovablePieces": 4 }));
    assert!(host.received_error().contains("Dice mode is not enabled"));
    server.send(&host, json!({ "action": "diceCheckInterruption", "room": room, "savedMovesRemaining": 2 }));
    assert!(host.received_error().contains("Dice mode is not enabled"));
}

#[test]
fn check_interruption_returns_turn_after_reply() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({ "骰子": true }));
    host.received();
    guest.received();

    at_secs(&mut server, 10);
    server.send(&host, move_message(&room));
    guest.received();
    host.received();

    at_secs(&mut server, 12);
    server.send(&host, flagged_move_message(&room, 2));
    let event = guest.received_single();
    host.received();
    assert_eq!(event["diceCheckInterruption"], true);
    assert_eq!(event["diceState"], json!({ "currentPlayer": "Black", "movesRemaining": 0 }));
    assert_eq!(event["timerState"]["currentPlayer"], "Black");
    assert_eq!(event["timerState"]["timeA"], 301000);

    at_secs(&mut server, 15);
    server.send(&guest, move_message(&room));
    let event = host.received_single();
    guest.received();
    assert_eq!(event["diceState"], json!({ "currentPlayer": "White", "movesRemaining": 2 }));
    assert_eq!(
        event["timerState"],
        json!({
            "timeA": 301000,
            "timeB": 300000,
            "currentPlayer": "White",
            "lastSwitchTime": T0_UNIX_MS + 16_000,
        })
    );

    // The restored budget runs out normally.
    at_secs(&mut server, 17);
    server.send(&host, move_message(&room));
    at_secs(&mut server, 18);
    server.send(&host, move_message(&room));
    let events = guest.received();
    assert_eq!(events[1]["diceState"], json!({ "currentPlayer": "Black", "movesRemaining": 3 }));
}

#[test]
fn explicit_check_interruption() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({ "骰子": true }));
    host.received();
    guest.received();

    server.send(&host, json!({ "action": "diceCheckInterruption", "room": room, "savedMovesRemaining": 2 }));
    let expected = json!({ "action": "diceCheckInterrupted", "room": room, "currentPlayer": "Black" });
    assert_eq!(host.received_single(), expected);
    assert_eq!(guest.received_single(), expected);

    server.send(&host, json!({ "action": "diceCheckInterruption", "room": room, "savedMovesRemaining": 1 }));
    assert!(host.received_error().contains("already pending"));

    server.send(&guest, json!({ "action": "diceCheckResolved", "room": room }));
    let expected = json!({
        "action": "diceCheckRestored",
        "room": room,
        "currentPlayer": "White",
        "movesRemaining": 2,
    });
    assert_eq!(host.received_single(), expected);
    assert_eq!(guest.received_single(), expected);

    // Nothing left to resolve.
    server.send(&guest, json!({ "action": "diceCheckResolved", "room": room }));
    host.assert_silent();
    guest.assert_silent();

    server.send(&host, json!({ "action": "diceCheckInterruption", "room": room, "savedMovesRemaining": 4 }));
    assert!(host.received_error().starts_with("Invalid message"));
}

#[test]
fn dice_roll_is_broadcast_and_resets_budget() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    start_game(&mut server, &host, &room, json!({ "骰子": true }));
    host.received();
    guest.received();

    server.send(&host, move_message(&room));
    host.received();
    guest.received();

    server.send(&host, json!({ "action": "requestDice", "room": room, "numMovablePieces": 5 }));
    let event = guest.received_single();
    assert_eq!(host.received_single(), event);
    assert_eq!(event["action"], "diceRolled");
    assert_eq!(event["currentPlayer"], "White");
    let rolls = event["rolls"].as_array().unwrap();
    assert_eq!(rolls.len(), 3);
    assert!(rolls.iter().all(|r| r.as_u64().unwrap() < 5));

    // Budget is back to three: two more moves keep the turn.
    server.send(&host, move_message(&room));
    server.send(&host, move_message(&room));
    let events = guest.received();
    assert_eq!(events[1]["diceState"], json!({ "currentPlayer": "White", "movesRemaining": 1 }));
    host.received();

    server.send(&host, json!({ "action": "requestDice", "room": room, "numMovablePieces": 0 }));
    assert!(host.received_error().starts_with("Invalid message"));
}

#[test]
fn rate_limit_rejects_excess_messages() {
    let mut server = TestServer::new();
    let (host, guest, room) = two_player_room(&mut server);
    // Consumed by `two_player_room`: one message each.
    for _ in 0..49 {
        server.send(&host, json!({ "action": "ping" }));
    }
    host.assert_silent();

    server.send(&host, move_message(&room));
    assert!(host.received_error().contains("Too many messages"));
    guest.assert_silent();

    // Other connections are unaffected.
    server.send(&guest, move_message(&room));
    assert_eq!(host.received_single()["action"], "move");

    server.set_time(Duration::from_millis(1001));
    server.send(&host, move_message(&room));
    assert_eq!(guest.received_single()["action"], "move");
}

#[test]
fn rate_limit_is_configurable() {
    let mut server = TestServer::with_options(ServerOptions {
        rate_limit: RateLimit { window: Duration::from_secs(10), max_messages: 2 },
    });
    let client = server.connect("client");
    create_room(&mut server, &client);
    create_room(&mut server, &client);
    server.send(&client, json!({ "action": "createRoom" }));
    assert!(client.received_error().contains("Too many messages"));
    assert_eq!(server.state().rooms().len(), 2);
}
