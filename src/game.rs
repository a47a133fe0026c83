// Per-room game state: the authoritative clock plus, in the dice variant, turn allocation.
// The two are kept in lockstep: the dice engine decides whether a move ends the turn and the
// clock charges time accordingly.

use log::debug;
use rand::Rng;

use crate::clock::{Clock, MillisDuration, ServerTimestamp, TimeControl, TimerState, TurnTransition};
use crate::dice::{DiceError, DiceSnapshot, DiceState, roll_dice};
use crate::force::Force;


#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GameState {
    clock: Clock,
    dice: Option<DiceState>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MoveResult {
    pub mover: Force,
    pub charged: MillisDuration,
    pub transition: TurnTransition,
    pub timer_state: TimerState,
    pub dice_state: Option<DiceSnapshot>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DiceRoll {
    pub rolls: Vec<u32>,
    pub current_player: Force,
}

impl GameState {
    pub fn new(control: &TimeControl, host_color: Force, dice_enabled: bool) -> Self {
        GameState {
            clock: Clock::new(control, host_color),
            dice: dice_enabled.then(DiceState::new),
        }
    }

    pub fn clock(&self) -> &Clock { &self.clock }
    pub fn dice(&self) -> Option<&DiceState> { self.dice.as_ref() }
    pub fn is_dice_game(&self) -> bool { self.dice.is_some() }
    pub fn timer_state(&self) -> TimerState { self.clock.timer_state() }
    pub fn dice_state(&self) -> Option<DiceSnapshot> { self.dice.as_ref().map(DiceState::snapshot) }

    // `check_budget`: see `DiceState::on_move`. Ignored outside of dice games.
    pub fn apply_move(&mut self, check_budget: Option<u8>, now: ServerTimestamp) -> MoveResult {
        let mover = self.clock.active_force();
        let transition = match &mut self.dice {
            None => TurnTransition::Switch,
            Some(dice) => dice.on_move(mover, check_budget),
        };
        let charged = self.clock.record_move(now, transition);
        self.check_sync();
        debug!("{:?} moved, charged {}, turn {:?}", mover, charged, transition);
        MoveResult {
            mover,
            charged,
            transition,
            timer_state: self.timer_state(),
            dice_state: self.dice_state(),
        }
    }

    // `None` if this is not a dice game.
    pub fn roll_dice<R: Rng + ?Sized>(
        &mut self, rng: &mut R, num_movable_piece_types: u32,
    ) -> Option<DiceRoll> {
        let dice = self.dice.as_mut()?;
        let rolls = roll_dice(rng, num_movable_piece_types);
        dice.reset_budget();
        Some(DiceRoll { rolls, current_player: dice.current_player() })
    }

    // Returns the player who has to answer the check. `Ok(None)` if this is not a dice game.
    pub fn interrupt_for_check(&mut self, saved_moves_remaining: u8) -> Result<Option<Force>, DiceError> {
        let Some(dice) = self.dice.as_mut() else {
            return Ok(None);
        };
        let next = dice.interrupt(saved_moves_remaining)?;
        self.clock.set_active_force(next);
        self.check_sync();
        Ok(Some(next))
    }

    // Returns the restored dice state, if there was an interruption to resolve.
    pub fn resolve_check(&mut self) -> Option<DiceSnapshot> {
        let restored = self.dice.as_mut()?.resolve()?;
        self.clock.set_active_force(restored.current_player);
        self.check_sync();
        Some(restored)
    }

    fn check_sync(&self) {
        if let Some(dice) = &self.dice {
            debug_assert_eq!(dice.current_player(), self.clock.active_force());
        }
    }
}
