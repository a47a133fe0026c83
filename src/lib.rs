#![forbid(unsafe_code)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod clock;
pub mod dice;
pub mod error;
pub mod event;
pub mod force;
pub mod game;
pub mod rate_limit;
pub mod room;
pub mod seat;
pub mod server;
pub mod test_util;
pub mod utc_time;
