//! Hysteresis state machine shared by every DCC variant.
//!
//! Upward pressure is judged on the minimum of the short "up" window, downward
//! pressure on the maximum of the long "down" window. Rules are evaluated in a
//! fixed order (upward rules from the lowest state to the highest, then
//! downward rules from the highest state to the lowest) and the first match
//! wins.

use crate::dcc::{ControlValue, DccProfile, DccState, StateId};
use crate::error::DccError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    Up,
    Down,
}

/// `from --(lower <= value < upper)--> to`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRule {
    pub from: StateId,
    pub pressure: Pressure,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub to: StateId,
}

impl TransitionRule {
    fn matches(&self, current: StateId, window_min: f64, window_max: f64) -> bool {
        if self.from != current {
            return false;
        }
        let value = match self.pressure {
            Pressure::Up => window_min,
            Pressure::Down => window_max,
        };
        self.lower.is_none_or(|lower| value >= lower)
            && self.upper.is_none_or(|upper| value < upper)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    /// Adjacent moves only: up from `i` when min >= t[i], down from `i` when max < t[i-1].
    pub fn stepwise(thresholds: &[f64]) -> Self {
        let states = thresholds.len() + 1;
        let mut rules = Vec::with_capacity(2 * thresholds.len());
        for from in 0..states - 1 {
            rules.push(TransitionRule {
                from,
                pressure: Pressure::Up,
                lower: Some(thresholds[from]),
                upper: None,
                to: from + 1,
            });
        }
        for from in (1..states).rev() {
            rules.push(TransitionRule {
                from,
                pressure: Pressure::Down,
                lower: None,
                upper: Some(thresholds[from - 1]),
                to: from - 1,
            });
        }
        Self { rules }
    }

    /// Band `j` spans `[t[j-1], t[j])`; a decision may cross several bands at once.
    pub fn ladder(thresholds: &[f64]) -> Self {
        let states = thresholds.len() + 1;
        let band = |state: StateId| {
            let lower = state.checked_sub(1).map(|below| thresholds[below]);
            let upper = thresholds.get(state).copied();
            (lower, upper)
        };

        let mut rules = Vec::new();
        for from in 0..states {
            for to in from + 1..states {
                let (lower, upper) = band(to);
                rules.push(TransitionRule {
                    from,
                    pressure: Pressure::Up,
                    lower,
                    upper,
                    to,
                });
            }
        }
        for from in (0..states).rev() {
            for to in (0..from).rev() {
                let (lower, upper) = band(to);
                rules.push(TransitionRule {
                    from,
                    pressure: Pressure::Down,
                    lower,
                    upper,
                    to,
                });
            }
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn evaluate(&self, current: StateId, window_min: f64, window_max: f64) -> Option<StateId> {
        self.rules
            .iter()
            .find(|rule| rule.matches(current, window_min, window_max))
            .map(|rule| rule.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChange {
    pub from: StateId,
    pub to: StateId,
    pub control: ControlValue,
}

#[derive(Debug, Clone)]
pub struct DccStateMachine {
    states: Vec<DccState>,
    table: TransitionTable,
    current: Option<StateId>,
    control: Option<ControlValue>,
}

impl DccStateMachine {
    pub fn new(profile: &DccProfile) -> Self {
        Self {
            states: profile.states().to_vec(),
            table: profile.transition_table(),
            current: None,
            control: None,
        }
    }

    pub fn initialize(&mut self, start: StateId) -> Result<ControlValue, DccError> {
        if self.current.is_some() {
            return Err(DccError::AlreadyInitialized);
        }
        let state = self.states.get(start).ok_or(DccError::UnknownState(start))?;
        let control = state.control.ok_or(DccError::NoControlValue(start))?;
        self.current = Some(start);
        self.control = Some(control);
        Ok(control)
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_state(&self) -> Result<StateId, DccError> {
        self.current.ok_or(DccError::Uninitialized)
    }

    pub fn current_state_name(&self) -> Option<&str> {
        self.current
            .and_then(|id| self.states.get(id))
            .map(|state| state.name.as_str())
    }

    pub fn control_value(&self) -> Result<ControlValue, DccError> {
        self.control.ok_or(DccError::Uninitialized)
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn decide(
        &mut self,
        window_min: f64,
        window_max: f64,
    ) -> Result<Option<StateChange>, DccError> {
        let current = self.current_state()?;
        for value in [window_min, window_max] {
            if !value.is_finite() {
                return Err(DccError::NonFiniteSample(value));
            }
        }

        let Some(next) = self.table.evaluate(current, window_min, window_max) else {
            return Ok(None);
        };
        let state = self.states.get(next).ok_or(DccError::UnknownState(next))?;
        if let Some(control) = state.control {
            self.control = Some(control);
        }
        self.current = Some(next);

        Ok(Some(StateChange {
            from: current,
            to: next,
            control: self.control_value()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcc::beacon_rate::{
        self, ACTIVE, BeaconRate3Params, BeaconRate5Params, RELAXED, RESTRICTED,
    };
    use crate::dcc::{HysteresisShape, ProfileKind};
    use std::time::Duration;

    fn three_state() -> DccStateMachine {
        let profile = beacon_rate::three_state(&BeaconRate3Params::default())
            .expect("default three-state profile");
        let mut machine = DccStateMachine::new(&profile);
        machine.initialize(RELAXED).expect("initialize");
        machine
    }

    fn five_state() -> DccStateMachine {
        let profile = beacon_rate::five_state(&BeaconRate5Params::default())
            .expect("default five-state profile");
        let mut machine = DccStateMachine::new(&profile);
        machine.initialize(0).expect("initialize");
        machine
    }

    #[test]
    fn decide_before_initialize_is_rejected() {
        let profile = beacon_rate::three_state(&BeaconRate3Params::default())
            .expect("default three-state profile");
        let mut machine = DccStateMachine::new(&profile);
        assert_eq!(machine.decide(0.5, 0.5), Err(DccError::Uninitialized));
        assert_eq!(machine.control_value(), Err(DccError::Uninitialized));
    }

    #[test]
    fn initialize_only_once() {
        let mut machine = three_state();
        assert_eq!(machine.initialize(ACTIVE), Err(DccError::AlreadyInitialized));
    }

    #[test]
    fn initialize_rejects_unknown_state() {
        let profile = beacon_rate::three_state(&BeaconRate3Params::default())
            .expect("default three-state profile");
        let mut machine = DccStateMachine::new(&profile);
        assert_eq!(machine.initialize(7), Err(DccError::UnknownState(7)));
        assert!(!machine.is_initialized());
    }

    #[test]
    fn three_state_steps_up_and_back_down() -> Result<(), DccError> {
        let mut machine = three_state();

        assert_eq!(machine.decide(0.10, 0.10)?, None);
        assert_eq!(machine.current_state()?, RELAXED);

        let change = machine.decide(0.20, 0.20)?.expect("relaxed -> active");
        assert_eq!((change.from, change.to), (RELAXED, ACTIVE));
        assert_eq!(
            change.control,
            ControlValue::BeaconInterval(Duration::from_millis(500))
        );

        assert_eq!(machine.decide(0.20, 0.30)?, None);

        let change = machine.decide(0.05, 0.10)?.expect("active -> relaxed");
        assert_eq!(change.to, RELAXED);
        assert_eq!(
            machine.control_value()?,
            ControlValue::BeaconInterval(Duration::from_millis(40))
        );
        Ok(())
    }

    #[test]
    fn three_state_never_skips_active() -> Result<(), DccError> {
        let mut machine = three_state();

        let change = machine.decide(0.90, 0.90)?.expect("relaxed -> active");
        assert_eq!(change.to, ACTIVE);
        let change = machine.decide(0.90, 0.90)?.expect("active -> restricted");
        assert_eq!(change.to, RESTRICTED);

        let change = machine.decide(0.0, 0.0)?.expect("restricted -> active");
        assert_eq!(change.to, ACTIVE);
        Ok(())
    }

    #[test]
    fn three_state_restricted_holds_while_max_high() -> Result<(), DccError> {
        let mut machine = three_state();
        machine.decide(0.5, 0.5)?;
        machine.decide(0.5, 0.5)?;
        assert_eq!(machine.current_state()?, RESTRICTED);

        // A short quiet spell shows up in the min but not in the long window max.
        assert_eq!(machine.decide(0.0, 0.45)?, None);
        assert_eq!(machine.current_state()?, RESTRICTED);
        Ok(())
    }

    #[test]
    fn ladder_jumps_to_highest_qualifying_band() -> Result<(), DccError> {
        let mut machine = five_state();

        let change = machine.decide(0.50, 0.50)?.expect("jump to top");
        assert_eq!((change.from, change.to), (0, 4));
        assert_eq!(
            change.control,
            ControlValue::BeaconInterval(Duration::from_secs(1))
        );
        Ok(())
    }

    #[test]
    fn ladder_moves_to_band_containing_min() -> Result<(), DccError> {
        let mut machine = five_state();
        let change = machine.decide(0.30, 0.38)?.expect("up");
        assert_eq!(change.to, 2);

        // Min fell but max still inside band 2: hold.
        assert_eq!(machine.decide(0.10, 0.30)?, None);

        let change = machine.decide(0.10, 0.20)?.expect("down");
        assert_eq!(change.to, 1);
        let change = machine.decide(0.0, 0.05)?.expect("down");
        assert_eq!(change.to, 0);
        Ok(())
    }

    #[test]
    fn ladder_descends_multiple_bands() -> Result<(), DccError> {
        let mut machine = five_state();
        machine.decide(0.45, 0.45)?;
        assert_eq!(machine.current_state()?, 4);

        let change = machine.decide(0.0, 0.26)?.expect("down");
        assert_eq!(change.to, 2);
        Ok(())
    }

    #[test]
    fn ladder_rule_order_is_up_ascending_then_down_descending() {
        let table = TransitionTable::ladder(&[0.15, 0.25, 0.35, 0.40]);
        let rules = table.rules();
        let first_down = rules
            .iter()
            .position(|rule| rule.pressure == Pressure::Down)
            .expect("down rules present");

        assert!(rules[..first_down].iter().all(|r| r.pressure == Pressure::Up));
        assert!(rules[..first_down].windows(2).all(|w| w[0].from <= w[1].from));
        assert!(rules[first_down..].windows(2).all(|w| w[0].from >= w[1].from));
        assert_eq!(rules.len(), 20);
    }

    #[test]
    fn unchanged_sentinel_keeps_previous_control() -> Result<(), DccError> {
        let profile = DccProfile::new(
            ProfileKind::BeaconRate3,
            vec![
                DccState::new(
                    "fast",
                    Some(ControlValue::BeaconInterval(Duration::from_millis(100))),
                ),
                DccState::new("hold", None),
                DccState::new(
                    "slow",
                    Some(ControlValue::BeaconInterval(Duration::from_secs(1))),
                ),
            ],
            vec![0.2, 0.5],
            HysteresisShape::Stepwise,
            None,
        )
        .expect("valid profile");
        let mut machine = DccStateMachine::new(&profile);
        machine.initialize(0)?;

        let change = machine.decide(0.3, 0.3)?.expect("fast -> hold");
        assert_eq!(change.to, 1);
        assert_eq!(
            change.control,
            ControlValue::BeaconInterval(Duration::from_millis(100))
        );
        Ok(())
    }

    #[test]
    fn non_finite_extremes_are_rejected() {
        let mut machine = three_state();
        assert!(matches!(
            machine.decide(f64::NAN, 0.2),
            Err(DccError::NonFiniteSample(_))
        ));
        assert_eq!(machine.current_state(), Ok(RELAXED));
    }
}
