//! Interfaces between the engine and whatever drives it.
//!
//! The engine never owns a clock or a radio. Timers, beacon delivery and
//! telemetry all go through the host passed into each call.

use crate::SimTime;
use crate::dcc::{ControlValue, StateChange};
use crate::error::DccError;
use std::time::Duration;

pub type EngineId = u32;

/// The three periodic timers an engine runs.
///
/// Declaration order doubles as the tie-break for timers due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DccTimer {
    Measurement,
    Decision,
    Beacon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub trait TimerService {
    fn schedule_at(&mut self, at: SimTime, timer: DccTimer) -> TimerHandle;

    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub engine_id: EngineId,
    pub sequence: u64,
    pub at: SimTime,
    pub control: ControlValue,
}

pub trait BeaconTransport {
    fn emit_beacon(&mut self, beacon: &Beacon) -> Result<(), DccError>;
}

/// Observational hooks. Nothing here feeds back into control decisions.
pub trait DccObserver {
    fn beacon_interval(&mut self, _engine: EngineId, _interval: Duration) {}

    fn state_changed(&mut self, _engine: EngineId, _at: SimTime, _change: &StateChange) {}

    fn anomaly(&mut self, _engine: EngineId, _at: SimTime, _error: &DccError) {}
}

pub trait DccHost: TimerService + BeaconTransport + DccObserver {}

impl<T> DccHost for T where T: TimerService + BeaconTransport + DccObserver {}
