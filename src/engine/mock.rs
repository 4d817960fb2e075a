use crate::SimTime;
use crate::channel::ChannelSensor;
use crate::dcc::StateChange;
use crate::engine::host::{
    Beacon, BeaconTransport, DccObserver, DccTimer, EngineId, TimerHandle, TimerService,
};
use crate::engine::DccEngine;
use crate::error::DccError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimer {
    handle: TimerHandle,
    at: SimTime,
    timer: DccTimer,
}

/// In-memory host for a single engine: records everything and fires timers on demand.
#[derive(Debug, Default)]
pub struct RecordingHost {
    next_handle: u64,
    pending: Vec<PendingTimer>,
    cancelled: usize,
    fail_transport: bool,
    pub beacons: Vec<Beacon>,
    pub intervals: Vec<(EngineId, Duration)>,
    pub changes: Vec<(SimTime, StateChange)>,
    pub anomalies: Vec<(SimTime, DccError)>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_transport() -> Self {
        Self {
            fail_transport: true,
            ..Self::default()
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled
    }

    pub fn pending_at(&self, timer: DccTimer) -> Option<SimTime> {
        self.pending
            .iter()
            .find(|pending| pending.timer == timer)
            .map(|pending| pending.at)
    }

    fn next_index(&self) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .min_by_key(|(_, pending)| (pending.at, pending.timer, pending.handle))
            .map(|(index, _)| index)
    }

    pub fn next_due(&self) -> Option<SimTime> {
        self.next_index().map(|index| self.pending[index].at)
    }

    pub fn fire_next(&mut self) -> Option<(SimTime, DccTimer)> {
        let index = self.next_index()?;
        let fired = self.pending.remove(index);
        Some((fired.at, fired.timer))
    }

    /// Drive `engine` until `until`, interleaving channel flips and timers.
    ///
    /// Channel flips at the same instant as a timer are delivered first.
    /// Errors are collected rather than stopping the run.
    pub fn run_until<S>(
        &mut self,
        engine: &mut DccEngine,
        channel: &mut S,
        until: SimTime,
    ) -> Vec<DccError>
    where
        S: ChannelSensor + ?Sized,
    {
        let mut errors = Vec::new();
        loop {
            let flip = channel.peek_time().filter(|at| *at <= until);
            let timer = self.next_due().filter(|at| *at <= until);
            let result = match (flip, timer) {
                (Some(flip_at), Some(timer_at)) if flip_at <= timer_at => {
                    match channel.next_transition() {
                        Some(transition) => engine.on_channel_transition(transition, self),
                        None => break,
                    }
                }
                (Some(_), None) => match channel.next_transition() {
                    Some(transition) => engine.on_channel_transition(transition, self),
                    None => break,
                },
                (_, Some(_)) => match self.fire_next() {
                    Some((at, timer)) => engine.dispatch(timer, at, self),
                    None => break,
                },
                (None, None) => break,
            };
            if let Err(error) = result {
                errors.push(error);
            }
        }
        errors
    }
}

impl TimerService for RecordingHost {
    fn schedule_at(&mut self, at: SimTime, timer: DccTimer) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle::new(self.next_handle);
        self.pending.push(PendingTimer { handle, at, timer });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.handle != handle);
        let removed = self.pending.len() != before;
        if removed {
            self.cancelled += 1;
        }
        removed
    }
}

impl BeaconTransport for RecordingHost {
    fn emit_beacon(&mut self, beacon: &Beacon) -> Result<(), DccError> {
        if self.fail_transport {
            return Err(DccError::Transport("transport offline".to_string()));
        }
        self.beacons.push(beacon.clone());
        Ok(())
    }
}

impl DccObserver for RecordingHost {
    fn beacon_interval(&mut self, engine: EngineId, interval: Duration) {
        self.intervals.push((engine, interval));
    }

    fn state_changed(&mut self, _engine: EngineId, at: SimTime, change: &StateChange) {
        self.changes.push((at, *change));
    }

    fn anomaly(&mut self, _engine: EngineId, at: SimTime, error: &DccError) {
        self.anomalies.push((at, error.clone()));
    }
}
