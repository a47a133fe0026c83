use std::{fmt, ops};

use enum_map::{EnumMap, enum_map};
use serde::{Deserialize, Serialize};

use crate::force::Force;
use crate::seat::{Seat, SeatAssignment};
use crate::utc_time::UtcDateTime;


// Added to the `serverTimestamp` sent with `gameStart`, so that clients start their clocks
// slightly in the future rather than in the past after the message has travelled to them.
pub const GAME_START_SYNC_BUFFER: MillisDuration = MillisDuration::from_millis(500);

// Added to `lastSwitchTime` on every move. The next elapsed-time computation then does not
// charge the new mover for the time it took to deliver this move to them.
pub const MOVE_COMPENSATION_BUFFER: MillisDuration = MillisDuration::from_millis(1000);


// Non-negative time span with millisecond precision, same as on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MillisDuration {
    ms: u64,
}

impl MillisDuration {
    pub const ZERO: Self = MillisDuration { ms: 0 };

    pub const fn from_millis(ms: u64) -> Self { MillisDuration { ms } }
    pub const fn from_secs(s: u64) -> Self { MillisDuration::from_millis(s * 1000) }

    pub fn as_millis(self) -> u64 { self.ms }
    pub fn saturating_sub(self, other: Self) -> Self {
        MillisDuration { ms: self.ms.saturating_sub(other.ms) }
    }
}

impl ops::Add for MillisDuration {
    type Output = Self;
    fn add(self, other: Self) -> Self { MillisDuration { ms: self.ms.saturating_add(other.ms) } }
}

impl fmt::Display for MillisDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}ms", self.ms) }
}


// Wall-clock instant as seen by the server, in Unix milliseconds. Server time is the single
// source of truth for all clock computations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTimestamp {
    unix_ms: u64,
}

impl ServerTimestamp {
    pub fn from_unix_millis(unix_ms: u64) -> Self { ServerTimestamp { unix_ms } }

    // Zero if `earlier` is in fact later, which happens regularly because of
    // `MOVE_COMPENSATION_BUFFER`.
    pub fn saturating_duration_since(self, earlier: ServerTimestamp) -> MillisDuration {
        MillisDuration::from_millis(self.unix_ms.saturating_sub(earlier.unix_ms))
    }
}

impl From<UtcDateTime> for ServerTimestamp {
    fn from(t: UtcDateTime) -> Self { ServerTimestamp::from_unix_millis(t.unix_millis()) }
}

impl ops::Add<MillisDuration> for ServerTimestamp {
    type Output = Self;
    fn add(self, d: MillisDuration) -> Self {
        ServerTimestamp { unix_ms: self.unix_ms.saturating_add(d.as_millis()) }
    }
}


#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TimeControl {
    pub white_time: MillisDuration,
    pub black_time: MillisDuration,
    // Fischer increment, granted to a player each time their turn passes to the opponent.
    pub increment: MillisDuration,
}

// Whether the turn passes to the opponent after a move. Decided by the turn allocation rules
// (always `Switch` in a normal game, may be `Retain` in dice mode).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TurnTransition {
    Retain,
    Switch,
}

// Clock snapshot as sent to clients.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub time_a: MillisDuration,
    pub time_b: MillisDuration,
    pub current_player: Force,
    // `None` until the first move.
    pub last_switch_time: Option<ServerTimestamp>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Clock {
    assignment: SeatAssignment,
    increment: MillisDuration,
    remaining_time: EnumMap<Seat, MillisDuration>,
    active_force: Force,
    last_switch: Option<ServerTimestamp>,
}

impl Clock {
    pub fn new(control: &TimeControl, host_color: Force) -> Self {
        let assignment = SeatAssignment::from_host_color(host_color);
        let starting_time = |seat| match assignment.force_of(seat) {
            Force::White => control.white_time,
            Force::Black => control.black_time,
        };
        Clock {
            assignment,
            increment: control.increment,
            remaining_time: enum_map! { seat => starting_time(seat) },
            active_force: Force::White,
            last_switch: None,
        }
    }

    pub fn active_force(&self) -> Force { self.active_force }
    pub fn is_started(&self) -> bool { self.last_switch.is_some() }
    pub fn last_switch(&self) -> Option<ServerTimestamp> { self.last_switch }
    pub fn time_left(&self, seat: Seat) -> MillisDuration { self.remaining_time[seat] }
    pub fn time_left_for(&self, force: Force) -> MillisDuration {
        self.time_left(self.assignment.seat_of(force))
    }

    // Charges the active player for the time since the previous move and hands the turn over
    // if requested. The very first move is free: the clock only starts running once somebody
    // has moved. Returns the charged time.
    pub fn record_move(&mut self, now: ServerTimestamp, transition: TurnTransition) -> MillisDuration {
        let mover = self.active_force;
        let elapsed = match self.last_switch {
            None => MillisDuration::ZERO,
            Some(last_switch) => now.saturating_duration_since(last_switch),
        };
        let seat = self.assignment.seat_of(mover);
        let mut remaining = self.remaining_time[seat].saturating_sub(elapsed);
        if transition == TurnTransition::Switch {
            remaining = remaining + self.increment;
            self.active_force = mover.opponent();
        }
        self.remaining_time[seat] = remaining;
        self.last_switch = Some(now + MOVE_COMPENSATION_BUFFER);
        elapsed
    }

    // Hands the turn to `force` without charging anybody. Used for out-of-sequence turn
    // changes, i.e. check interruptions and their resolution.
    pub fn set_active_force(&mut self, force: Force) { self.active_force = force; }

    pub fn timer_state(&self) -> TimerState {
        TimerState {
            time_a: self.remaining_time[Seat::A],
            time_b: self.remaining_time[Seat::B],
            current_player: self.active_force,
            last_switch_time: self.last_switch,
        }
    }
}
