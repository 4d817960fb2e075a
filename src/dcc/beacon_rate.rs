//! Beacon-rate DCC: each state selects the interval between beacons.
//!
//! Two ladders are provided. The three-state ladder (Relaxed, Active,
//! Restricted) moves one step per decision. The five-state ladder jumps
//! straight to the band holding the observed load.

use crate::config::ConfigError;
use crate::dcc::{
    ControlValue, DccProfile, DccState, HysteresisShape, ProfileKind, duration_from_secs,
};
use serde::Deserialize;

pub const RELAXED: usize = 0;
pub const ACTIVE: usize = 1;
pub const RESTRICTED: usize = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeaconRate3Params {
    pub min_interval_secs: f64,
    pub ref_interval_secs: f64,
    pub max_interval_secs: f64,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

impl Default for BeaconRate3Params {
    fn default() -> Self {
        Self {
            min_interval_secs: 0.04,
            ref_interval_secs: 0.50,
            max_interval_secs: 1.00,
            low_threshold: 0.15,
            high_threshold: 0.40,
        }
    }
}

pub fn three_state(params: &BeaconRate3Params) -> Result<DccProfile, ConfigError> {
    let interval = |field, secs| {
        duration_from_secs(field, secs).map(|d| Some(ControlValue::BeaconInterval(d)))
    };
    let states = vec![
        DccState::new("relaxed", interval("min_interval_secs", params.min_interval_secs)?),
        DccState::new("active", interval("ref_interval_secs", params.ref_interval_secs)?),
        DccState::new(
            "restricted",
            interval("max_interval_secs", params.max_interval_secs)?,
        ),
    ];
    DccProfile::new(
        ProfileKind::BeaconRate3,
        states,
        vec![params.low_threshold, params.high_threshold],
        HysteresisShape::Stepwise,
        None,
    )
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeaconRate5Params {
    pub intervals_secs: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl Default for BeaconRate5Params {
    fn default() -> Self {
        Self {
            intervals_secs: vec![0.04, 0.1, 0.3, 0.5, 1.0],
            thresholds: vec![0.15, 0.25, 0.35, 0.40],
        }
    }
}

pub fn five_state(params: &BeaconRate5Params) -> Result<DccProfile, ConfigError> {
    let states = params
        .intervals_secs
        .iter()
        .enumerate()
        .map(|(index, secs)| {
            let interval = duration_from_secs("intervals_secs", *secs)?;
            Ok(DccState::new(
                format!("state-{index}"),
                Some(ControlValue::BeaconInterval(interval)),
            ))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    DccProfile::new(
        ProfileKind::BeaconRate5,
        states,
        params.thresholds.clone(),
        HysteresisShape::Ladder,
        None,
    )
}
