//! Transmit-power DCC: beacons go out at a fixed interval and each state
//! selects the power level, shrinking the interference range as load grows.

use crate::config::ConfigError;
use crate::dcc::{
    ControlValue, DccProfile, DccState, HysteresisShape, ProfileKind, duration_from_secs,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TxPowerParams {
    pub levels_mw: Vec<u32>,
    pub thresholds: Vec<f64>,
    pub beacon_interval_secs: f64,
}

impl Default for TxPowerParams {
    fn default() -> Self {
        Self {
            levels_mw: vec![100, 50, 20],
            thresholds: vec![0.20, 0.40],
            beacon_interval_secs: 0.1,
        }
    }
}

pub fn profile(params: &TxPowerParams) -> Result<DccProfile, ConfigError> {
    if params.levels_mw.contains(&0) {
        return Err(ConfigError::Invalid(
            "tx_power: power levels must be non-zero".to_string(),
        ));
    }
    let states = params
        .levels_mw
        .iter()
        .enumerate()
        .map(|(index, milliwatts)| {
            DccState::new(
                format!("level-{}", index + 1),
                Some(ControlValue::TxPower {
                    milliwatts: *milliwatts,
                }),
            )
        })
        .collect();

    DccProfile::new(
        ProfileKind::TxPower,
        states,
        params.thresholds.clone(),
        HysteresisShape::Ladder,
        Some(duration_from_secs(
            "beacon_interval_secs",
            params.beacon_interval_secs,
        )?),
    )
}
