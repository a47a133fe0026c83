use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum::EnumIter;


// Side of the board. Serialized as "White"/"Black", which is also what clients
// put into `hostColor` and what they expect in `currentPlayer`.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Enum, EnumIter, Serialize, Deserialize,
)]
pub enum Force {
    White,
    Black,
}

impl Force {
    pub fn opponent(self) -> Force {
        match self {
            Force::White => Force::Black,
            Force::Black => Force::White,
        }
    }
}
