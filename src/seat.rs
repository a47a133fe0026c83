use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::force::Force;


// Seats are positional, not colors: `A` belongs to the room host and `B` to the guest.
// Which seat plays White is decided per game (see `SeatAssignment`).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Enum, EnumIter, Serialize, Deserialize,
)]
pub enum Seat {
    A,
    B,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SeatAssignment {
    white_is_a: bool,
}

impl SeatAssignment {
    pub fn from_host_color(host_color: Force) -> Self {
        SeatAssignment { white_is_a: host_color == Force::White }
    }


    pub fn seat_of(self, force: Force) -> Seat {
        match (force, self.white_is_a) {
            (Force::White, true) | (Force::Black, false) => Seat::A,
            (Force::White, false) | (Force::Black, true) => Seat::B,
        }
    }

    pub fn force_of(self, seat: Seat) -> Force {
        match (seat, self.white_is_a) {
            (Seat::A, true) | (Seat::B, false) => Force::White,
            (Seat::A, false) | (Seat::B, true) => Force::Black,
        }
    }
}
