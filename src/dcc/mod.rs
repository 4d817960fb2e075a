use crate::config::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub mod beacon_rate;
pub mod data_rate;
pub mod machine;
pub mod tx_power;
pub mod window;

use beacon_rate::{BeaconRate3Params, BeaconRate5Params};
use data_rate::DataRateParams;
use machine::TransitionTable;
use tx_power::TxPowerParams;

pub use machine::{DccStateMachine, StateChange};
pub use window::OccupancyWindow;

/// Ordinal of an operating point; 0 is the most conservative state.
pub type StateId = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    BeaconInterval(Duration),
    /// Index into the 10 MHz OFDM rate table.
    DataRate { mcs: u8 },
    TxPower { milliwatts: u32 },
}

impl ControlValue {
    pub fn beacon_interval(&self) -> Option<Duration> {
        match self {
            Self::BeaconInterval(interval) => Some(*interval),
            _ => None,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeaconInterval(interval) => write!(f, "interval {interval:?}"),
            Self::DataRate { mcs } => match data_rate::bitrate_for_mcs(*mcs) {
                Some(mbps) => write!(f, "{mbps} Mbit/s (mcs {mcs})"),
                None => write!(f, "mcs {mcs}"),
            },
            Self::TxPower { milliwatts } => write!(f, "{milliwatts} mW"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DccState {
    pub name: String,
    /// `None` keeps whatever control value is currently applied.
    pub control: Option<ControlValue>,
}

impl DccState {
    pub fn new(name: impl Into<String>, control: Option<ControlValue>) -> Self {
        Self {
            name: name.into(),
            control,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisShape {
    /// One step per decision: up from `i` when min >= t[i], down when max < t[i-1].
    Stepwise,
    /// Jump straight to the band that contains the window min (up) or max (down).
    Ladder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProfileKind {
    #[serde(rename = "beacon_rate_3")]
    BeaconRate3,
    #[serde(rename = "beacon_rate_5")]
    BeaconRate5,
    #[serde(rename = "data_rate")]
    DataRate,
    #[serde(rename = "tx_power")]
    TxPower,
}

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeaconRate3 => "beacon_rate_3",
            Self::BeaconRate5 => "beacon_rate_5",
            Self::DataRate => "data_rate",
            Self::TxPower => "tx_power",
        }
    }

    pub fn default_windows(self) -> (Duration, Duration) {
        match self {
            Self::BeaconRate3 | Self::BeaconRate5 => {
                (Duration::from_secs(1), Duration::from_secs(5))
            }
            Self::DataRate | Self::TxPower => (Duration::from_secs(1), Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DccProfile {
    kind: ProfileKind,
    states: Vec<DccState>,
    thresholds: Vec<f64>,
    shape: HysteresisShape,
    initial_state: StateId,
    /// Fixed beacon interval for variants whose knob is not the interval.
    fixed_interval: Option<Duration>,
}

impl DccProfile {
    pub fn new(
        kind: ProfileKind,
        states: Vec<DccState>,
        thresholds: Vec<f64>,
        shape: HysteresisShape,
        fixed_interval: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        if states.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "{}: at least two states required, got {}",
                kind.as_str(),
                states.len()
            )));
        }
        if thresholds.len() + 1 != states.len() {
            return Err(ConfigError::Invalid(format!(
                "{}: {} states need {} thresholds, got {}",
                kind.as_str(),
                states.len(),
                states.len() - 1,
                thresholds.len()
            )));
        }
        for threshold in &thresholds {
            if !threshold.is_finite() || *threshold <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{}: threshold must be positive, got {threshold}",
                    kind.as_str()
                )));
            }
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::Invalid(format!(
                "{}: thresholds must be strictly ascending: {thresholds:?}",
                kind.as_str()
            )));
        }

        let initial_state = 0;
        let initial_control = states[initial_state].control;
        if initial_control.is_none() {
            return Err(ConfigError::Invalid(format!(
                "{}: initial state {:?} has no control value",
                kind.as_str(),
                states[initial_state].name
            )));
        }

        let interval_knob = initial_control.and_then(|c| c.beacon_interval()).is_some();
        if let Some(zero) = states
            .iter()
            .filter_map(|state| state.control.and_then(|c| c.beacon_interval()))
            .find(|interval| interval.is_zero())
        {
            return Err(ConfigError::Invalid(format!(
                "{}: beacon interval must be positive, got {zero:?}",
                kind.as_str()
            )));
        }
        match fixed_interval {
            None if !interval_knob => {
                return Err(ConfigError::Invalid(format!(
                    "{}: a fixed beacon interval is required",
                    kind.as_str()
                )));
            }
            Some(interval) if interval.is_zero() => {
                return Err(ConfigError::Invalid(format!(
                    "{}: fixed beacon interval must be positive",
                    kind.as_str()
                )));
            }
            _ => {}
        }

        Ok(Self {
            kind,
            states,
            thresholds,
            shape,
            initial_state,
            fixed_interval,
        })
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn states(&self) -> &[DccState] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&DccState> {
        self.states.get(id)
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn shape(&self) -> HysteresisShape {
        self.shape
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    pub fn fixed_interval(&self) -> Option<Duration> {
        self.fixed_interval
    }

    pub fn transition_table(&self) -> TransitionTable {
        match self.shape {
            HysteresisShape::Stepwise => TransitionTable::stepwise(&self.thresholds),
            HysteresisShape::Ladder => TransitionTable::ladder(&self.thresholds),
        }
    }
}

pub(crate) fn duration_from_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be a positive number of seconds, got {secs}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSection {
    pub kind: ProfileKind,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

fn params_or_default<T>(params: &Option<serde_json::Value>) -> Result<T, ConfigError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match params {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(T::default()),
    }
}

// Profile factory
pub fn create_profile(section: &ProfileSection) -> Result<DccProfile, ConfigError> {
    match section.kind {
        ProfileKind::BeaconRate3 => {
            beacon_rate::three_state(&params_or_default::<BeaconRate3Params>(&section.params)?)
        }
        ProfileKind::BeaconRate5 => {
            beacon_rate::five_state(&params_or_default::<BeaconRate5Params>(&section.params)?)
        }
        ProfileKind::DataRate => {
            data_rate::profile(&params_or_default::<DataRateParams>(&section.params)?)
        }
        ProfileKind::TxPower => {
            tx_power::profile(&params_or_default::<TxPowerParams>(&section.params)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interval_states(count: usize) -> Vec<DccState> {
        (0..count)
            .map(|index| {
                DccState::new(
                    format!("s{index}"),
                    Some(ControlValue::BeaconInterval(Duration::from_millis(
                        100 * (index as u64 + 1),
                    ))),
                )
            })
            .collect()
    }

    #[test]
    fn factory_builds_every_kind_with_defaults() -> Result<(), ConfigError> {
        for (kind, states) in [
            (ProfileKind::BeaconRate3, 3),
            (ProfileKind::BeaconRate5, 5),
            (ProfileKind::DataRate, 4),
            (ProfileKind::TxPower, 3),
        ] {
            let profile = create_profile(&ProfileSection { kind, params: None })?;
            assert_eq!(profile.kind(), kind);
            assert_eq!(profile.states().len(), states);
            assert_eq!(profile.thresholds().len(), states - 1);
        }
        Ok(())
    }

    #[test]
    fn factory_applies_param_overrides() -> Result<(), ConfigError> {
        let section = ProfileSection {
            kind: ProfileKind::BeaconRate3,
            params: Some(json!({ "low_threshold": 0.2 })),
        };
        let profile = create_profile(&section)?;
        assert_eq!(profile.thresholds(), &[0.2, 0.40]);
        Ok(())
    }

    #[test]
    fn factory_rejects_malformed_params() {
        let section = ProfileSection {
            kind: ProfileKind::TxPower,
            params: Some(json!({ "levels_mw": "loud" })),
        };
        assert!(matches!(
            create_profile(&section),
            Err(ConfigError::Params(_))
        ));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let result = DccProfile::new(
            ProfileKind::BeaconRate3,
            interval_states(3),
            vec![0.0, 0.4],
            HysteresisShape::Stepwise,
            None,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let result = DccProfile::new(
            ProfileKind::BeaconRate5,
            interval_states(3),
            vec![0.4, 0.15],
            HysteresisShape::Ladder,
            None,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_threshold_count_mismatch() {
        let result = DccProfile::new(
            ProfileKind::BeaconRate5,
            interval_states(4),
            vec![0.15, 0.4],
            HysteresisShape::Ladder,
            None,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn initial_state_needs_a_control_value() {
        let mut states = interval_states(3);
        states[0].control = None;
        let result = DccProfile::new(
            ProfileKind::BeaconRate3,
            states,
            vec![0.15, 0.4],
            HysteresisShape::Stepwise,
            None,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn non_interval_knob_needs_fixed_interval() {
        let states = vec![
            DccState::new("high", Some(ControlValue::TxPower { milliwatts: 100 })),
            DccState::new("low", Some(ControlValue::TxPower { milliwatts: 20 })),
        ];
        let result = DccProfile::new(
            ProfileKind::TxPower,
            states,
            vec![0.3],
            HysteresisShape::Ladder,
            None,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn control_value_display() {
        assert_eq!(
            ControlValue::DataRate { mcs: 2 }.to_string(),
            "6 Mbit/s (mcs 2)"
        );
        assert_eq!(ControlValue::TxPower { milliwatts: 20 }.to_string(), "20 mW");
    }
}
