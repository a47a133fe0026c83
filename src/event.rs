// Wire protocol: JSON objects discriminated by the `action` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::clock::{MillisDuration, ServerTimestamp, TimerState};
use crate::dice::{DiceSnapshot, MOVES_PER_TURN};
use crate::error::RelayRejection;
use crate::force::Force;
use crate::room::RoomId;


pub const BOARD_SIZE: i64 = 8;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    pub room: RoomId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub white_time_ms: MillisDuration,
    #[serde(default, deserialize_with = "null_as_default")]
    pub black_time_ms: MillisDuration,
    #[serde(default, deserialize_with = "null_as_default")]
    pub increment_ms: MillisDuration,
    pub host_color: Force,
    #[serde(default, deserialize_with = "null_as_default")]
    pub game_modes: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mine_positions: Vec<Value>,
}

// Clients send `null` for settings they leave unset.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Move as reported by the moving client. Move legality is the clients' business; the server
// only checks that the coordinates are on the board. Unknown fields are relayed untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub room: RoomId,
    pub from_row: i64,
    pub from_col: i64,
    pub to_row: i64,
    pub to_col: i64,
    // Everything else, including `movedPieceType` and the check interruption fields, stays
    // exactly as the client sent it.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Set when the move left the mover's own king in check.
const DICE_CHECK_INTERRUPTION_FIELD: &str = "diceCheckInterruption";
// Dice moves the mover had left when the check interrupted their turn.
const SAVED_DICE_MOVES_FIELD: &str = "savedDiceMoves";

// Payload of informational messages that are forwarded verbatim to the opponent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForwardedMessage {
    pub room: RoomId,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayClientEvent {
    CreateRoom,
    JoinRoom {
        room: RoomId,
    },
    StartGame(StartGameRequest),
    Move(MoveRequest),
    RequestDice {
        room: RoomId,
        #[serde(default = "default_num_movable_pieces")]
        num_movable_pieces: u32,
    },
    DiceCheckInterruption {
        room: RoomId,
        saved_moves_remaining: u8,
    },
    DiceCheckResolved {
        room: RoomId,
    },
    LeaveRoom {
        room: RoomId,
    },
    Surrender(ForwardedMessage),
    DrawOffer(ForwardedMessage),
    DrawResponse(ForwardedMessage),
    GameOver(ForwardedMessage),
    #[serde(other)]
    Unrecognized,
}

fn default_num_movable_pieces() -> u32 { 1 }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartNotice {
    pub room: RoomId,
    pub white_time_ms: MillisDuration,
    pub black_time_ms: MillisDuration,
    pub increment_ms: MillisDuration,
    pub host_color: Force,
    pub game_modes: Map<String, Value>,
    pub mine_positions: Vec<Value>,
    pub server_timestamp: ServerTimestamp,
    pub timer_state: TimerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_state: Option<DiceSnapshot>,
}

// Move echo. Both states are absent when the room has no clock, in which case this is exactly
// the message the mover sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNotice {
    #[serde(flatten)]
    pub request: MoveRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_state: Option<TimerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_state: Option<DiceSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayServerEvent {
    RoomCreated {
        room: RoomId,
    },
    JoinedRoom {
        room: RoomId,
    },
    PlayerJoined {
        room: RoomId,
    },
    PlayerLeft {
        room: RoomId,
    },
    PromotedToHost {
        room: RoomId,
    },
    GameStart(GameStartNotice),
    Move(MoveNotice),
    DiceRolled {
        room: RoomId,
        rolls: Vec<u32>,
        current_player: Force,
    },
    DiceCheckInterrupted {
        room: RoomId,
        current_player: Force,
    },
    DiceCheckRestored {
        room: RoomId,
        current_player: Force,
        moves_remaining: u8,
    },
    Surrender(ForwardedMessage),
    DrawOffer(ForwardedMessage),
    DrawResponse(ForwardedMessage),
    GameOver(ForwardedMessage),
    Error {
        message: String,
    },
}

impl RelayClientEvent {
    pub fn parse(text: &str) -> Result<Self, RelayRejection> {
        let event: RelayClientEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    // Checks value ranges that the types alone do not capture.
    pub fn validate(&self) -> Result<(), RelayRejection> {
        match self {
            RelayClientEvent::Move(mv) => mv.validate(),
            RelayClientEvent::RequestDice { num_movable_pieces, .. } => {
                if *num_movable_pieces == 0 {
                    return Err(RelayRejection::invalid("numMovablePieces must be positive"));
                }
                Ok(())
            }
            RelayClientEvent::DiceCheckInterruption { saved_moves_remaining, .. } => {
                if !(1..=MOVES_PER_TURN).contains(saved_moves_remaining) {
                    return Err(RelayRejection::invalid(format!(
                        "savedMovesRemaining must be between 1 and {MOVES_PER_TURN}"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl MoveRequest {
    fn validate(&self) -> Result<(), RelayRejection> {
        let coords = [
            ("fromRow", self.from_row),
            ("fromCol", self.from_col),
            ("toRow", self.to_row),
            ("toCol", self.to_col),
        ];
        for (name, value) in coords {
            if !(0..BOARD_SIZE).contains(&value) {
                return Err(RelayRejection::invalid(format!(
                    "{name} must be between 0 and {}, got {value}",
                    BOARD_SIZE - 1
                )));
            }
        }
        self.dice_check_interruption()?;
        self.saved_dice_moves()?;
        Ok(())
    }

    fn dice_check_interruption(&self) -> Result<bool, RelayRejection> {
        match self.extra.get(DICE_CHECK_INTERRUPTION_FIELD) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(RelayRejection::invalid(format!(
                "{DICE_CHECK_INTERRUPTION_FIELD} must be a boolean, got {other}"
            ))),
        }
    }

    fn saved_dice_moves(&self) -> Result<Option<u8>, RelayRejection> {
        let Some(value) = self.extra.get(SAVED_DICE_MOVES_FIELD).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        value
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .filter(|&n| n <= MOVES_PER_TURN)
            .map(Some)
            .ok_or_else(|| {
                RelayRejection::invalid(format!(
                    "{SAVED_DICE_MOVES_FIELD} must be between 0 and {MOVES_PER_TURN}, got {value}"
                ))
            })
    }

    // Remaining dice budget if this move raised a check interruption. Assumes `validate`.
    pub fn check_budget(&self) -> Option<u8> {
        match self.dice_check_interruption() {
            Ok(true) => self.saved_dice_moves().ok().flatten(),
            _ => None,
        }
    }
}
