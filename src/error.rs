use std::fmt;

use crate::room::RoomId;


// Reasons for refusing a client request. Always reported to the sender only, and never
// accompanied by a state change.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RelayRejection {
    // Malformed envelope: unparsable JSON, missing fields, wrong types or out-of-range values.
    InvalidMessage { reason: String },
    NoSuchRoom { room: RoomId },
    RoomFull { room: RoomId },
    // Room-scoped request from a connection that is not in the room.
    NotInRoom { room: RoomId },
    NotEnoughPlayers { room: RoomId },
    DiceModeDisabled { room: RoomId },
    InterruptionPending { room: RoomId },
    RateLimited,
}

impl RelayRejection {
    pub fn invalid(reason: impl Into<String>) -> Self {
        RelayRejection::InvalidMessage { reason: reason.into() }
    }
}

impl fmt::Display for RelayRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMessage { reason } => write!(f, "Invalid message: {reason}"),
            Self::NoSuchRoom { room } => write!(f, "Room {room} does not exist"),
            Self::RoomFull { room } => write!(f, "Room {room} is full"),
            Self::NotInRoom { room } => write!(f, "You are not in room {room}"),
            Self::NotEnoughPlayers { room } => {
                write!(f, "Room {room} needs exactly two players to start a game")
            }
            Self::DiceModeDisabled { room } => {
                write!(f, "Dice mode is not enabled in room {room}")
            }
            Self::InterruptionPending { room } => {
                write!(f, "A check interruption is already pending in room {room}")
            }
            Self::RateLimited => write!(f, "Too many messages, slow down"),
        }
    }
}

impl From<serde_json::Error> for RelayRejection {
    fn from(err: serde_json::Error) -> Self { RelayRejection::invalid(err.to_string()) }
}
