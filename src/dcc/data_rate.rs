//! Data-rate DCC: beacons go out at a fixed interval and each state selects
//! the modulation and coding scheme they are sent with. Higher load moves to
//! faster rates so every beacon holds the channel for less time.

use crate::config::ConfigError;
use crate::dcc::{
    ControlValue, DccProfile, DccState, HysteresisShape, ProfileKind, duration_from_secs,
};
use serde::Deserialize;

/// 802.11p OFDM rates on a 10 MHz channel, indexed by MCS.
pub const OFDM_10MHZ_RATES_MBPS: [f64; 8] = [3.0, 4.5, 6.0, 9.0, 12.0, 18.0, 24.0, 27.0];

pub fn mcs_for_bitrate(mbps: f64) -> Option<u8> {
    OFDM_10MHZ_RATES_MBPS
        .iter()
        .position(|rate| (rate - mbps).abs() < 1e-9)
        .map(|index| index as u8)
}

pub fn bitrate_for_mcs(mcs: u8) -> Option<f64> {
    OFDM_10MHZ_RATES_MBPS.get(mcs as usize).copied()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataRateParams {
    pub bitrates_mbps: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub beacon_interval_secs: f64,
}

impl Default for DataRateParams {
    fn default() -> Self {
        Self {
            bitrates_mbps: vec![3.0, 6.0, 12.0, 18.0],
            thresholds: vec![0.15, 0.40, 0.60],
            beacon_interval_secs: 0.1,
        }
    }
}

pub fn profile(params: &DataRateParams) -> Result<DccProfile, ConfigError> {
    let states = params
        .bitrates_mbps
        .iter()
        .enumerate()
        .map(|(index, mbps)| {
            let mcs = mcs_for_bitrate(*mbps).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "bitrate {mbps} Mbit/s is not a 10 MHz OFDM rate ({OFDM_10MHZ_RATES_MBPS:?})"
                ))
            })?;
            Ok(DccState::new(
                format!("level-{}", index + 1),
                Some(ControlValue::DataRate { mcs }),
            ))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    DccProfile::new(
        ProfileKind::DataRate,
        states,
        params.thresholds.clone(),
        HysteresisShape::Ladder,
        Some(duration_from_secs(
            "beacon_interval_secs",
            params.beacon_interval_secs,
        )?),
    )
}
