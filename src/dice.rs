// Turn allocation for the dice variant.
//
// Each turn consists of up to `MOVES_PER_TURN` moves. A move that leaves the mover's own king
// in check interrupts the turn: the opponent gets to play exactly one reply, after which the
// interrupted player continues with the moves they had left.

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::TurnTransition;
use crate::force::Force;


pub const MOVES_PER_TURN: u8 = 3;
pub const ROLLS_PER_REQUEST: usize = 3;

// Key in `gameModes` that enables the dice variant.
pub const DICE_GAME_MODE: &str = "骰子";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interruption {
    pub interrupted_player: Force,
    pub saved_moves_remaining: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TurnPhase {
    DiceActive,
    Interrupted(Interruption),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiceError {
    // Nested interruptions are not supported: the pending one must be resolved first.
    InterruptionPending,
}

// Dice state snapshot as sent to clients.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceSnapshot {
    pub current_player: Force,
    pub moves_remaining: u8,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DiceState {
    current_player: Force,
    moves_remaining: u8,
    interruption: Option<Interruption>,
}

impl DiceState {
    pub fn new() -> Self {
        DiceState {
            current_player: Force::White,
            moves_remaining: MOVES_PER_TURN,
            interruption: None,
        }
    }

    pub fn current_player(&self) -> Force { self.current_player }
    pub fn moves_remaining(&self) -> u8 { self.moves_remaining }
    pub fn interruption(&self) -> Option<Interruption> { self.interruption }
    pub fn phase(&self) -> TurnPhase {
        match self.interruption {
            None => TurnPhase::DiceActive,
            Some(interruption) => TurnPhase::Interrupted(interruption),
        }
    }

    pub fn snapshot(&self) -> DiceSnapshot {
        DiceSnapshot {
            current_player: self.current_player,
            moves_remaining: self.moves_remaining,
        }
    }

    // Accounts for a move by `mover`. `check_budget` is set when the client reported that the
    // move exposed the mover's own king; it holds the number of moves the mover had left.
    pub fn on_move(&mut self, mover: Force, check_budget: Option<u8>) -> TurnTransition {
        if let Some(interruption) = self.interruption {
            if mover != interruption.interrupted_player {
                if check_budget.is_some() {
                    warn!("Ignoring check interruption raised while another one is pending");
                }
                debug!(
                    "Corrective reply played, returning turn to {:?} with {} moves",
                    interruption.interrupted_player, interruption.saved_moves_remaining
                );
                self.restore(interruption);
                return TurnTransition::Switch;
            }
            warn!("{:?} moved while their turn was interrupted", mover);
        } else if let Some(saved_moves_remaining) = check_budget.filter(|&n| n > 0) {
            self.interrupt_turn(mover, saved_moves_remaining);
            return TurnTransition::Switch;
        }

        self.moves_remaining = self.moves_remaining.saturating_sub(1);
        if self.moves_remaining > 0 {
            TurnTransition::Retain
        } else {
            self.current_player = mover.opponent();
            self.moves_remaining = MOVES_PER_TURN;
            TurnTransition::Switch
        }
    }

    // Explicit counterpart of a flagged move: interrupts the current player's turn. Returns
    // the player who now has to reply.
    pub fn interrupt(&mut self, saved_moves_remaining: u8) -> Result<Force, DiceError> {
        if self.interruption.is_some() {
            return Err(DiceError::InterruptionPending);
        }
        self.interrupt_turn(self.current_player, saved_moves_remaining);
        Ok(self.current_player)
    }

    // Explicit counterpart of a corrective reply. Returns `None` if there was nothing to resolve.
    pub fn resolve(&mut self) -> Option<DiceSnapshot> {
        let interruption = self.interruption?;
        self.restore(interruption);
        Some(self.snapshot())
    }

    // Grants a fresh budget to the current player. A pending interruption keeps its own budget.
    pub fn reset_budget(&mut self) {
        if self.interruption.is_none() {
            self.moves_remaining = MOVES_PER_TURN;
        }
    }

    fn interrupt_turn(&mut self, interrupted_player: Force, saved_moves_remaining: u8) {
        debug!(
            "Turn of {:?} interrupted by check with {} moves saved",
            interrupted_player, saved_moves_remaining
        );
        self.interruption = Some(Interruption { interrupted_player, saved_moves_remaining });
        self.moves_remaining = 0;
        self.current_player = interrupted_player.opponent();
    }

    fn restore(&mut self, interruption: Interruption) {
        self.current_player = interruption.interrupted_player;
        self.moves_remaining = interruption.saved_moves_remaining.min(MOVES_PER_TURN);
        self.interruption = None;
    }
}

// Draws `ROLLS_PER_REQUEST` independent indices into the list of piece types the current
// player can move. `num_movable_piece_types` must be positive.
pub fn roll_dice<R: Rng + ?Sized>(rng: &mut R, num_movable_piece_types: u32) -> Vec<u32> {
    assert!(num_movable_piece_types > 0);
    (0..ROLLS_PER_REQUEST).map(|_| rng.random_range(0..num_movable_piece_types)).collect()
}
