//! The composition root: one engine per node.

use crate::SimTime;
use crate::channel::{ChannelLevel, ChannelOccupancyTracker, ChannelTransition};
use crate::config::ConfigError;
use crate::dcc::{
    ControlValue, DccProfile, DccStateMachine, OccupancyWindow, ProfileKind, StateChange, StateId,
};
use crate::error::DccError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod beacon;
pub mod host;
pub mod mock;

pub use beacon::{BeaconScheduler, StartPlan};
pub use host::{
    Beacon, BeaconTransport, DccHost, DccObserver, DccTimer, EngineId, TimerHandle, TimerService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub sampling_period: Duration,
    pub decision_period: Duration,
    /// History covered by the window whose min drives upward moves.
    pub time_up: Duration,
    /// History covered by the window whose max drives downward moves.
    pub time_down: Duration,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSizes {
    pub up: usize,
    pub down: usize,
}

impl EngineConfig {
    pub fn for_profile(kind: ProfileKind) -> Self {
        let (time_up, time_down) = kind.default_windows();
        Self {
            sampling_period: Duration::from_secs(1),
            decision_period: Duration::from_secs(1),
            time_up,
            time_down,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<WindowSizes, ConfigError> {
        if self.sampling_period.is_zero() {
            return Err(ConfigError::Invalid(
                "sampling period must be positive".to_string(),
            ));
        }
        if self.decision_period < self.sampling_period {
            return Err(ConfigError::Invalid(format!(
                "decision period {:?} is shorter than sampling period {:?}",
                self.decision_period, self.sampling_period
            )));
        }
        Ok(WindowSizes {
            up: window_capacity("time_up", self.time_up, self.sampling_period)?,
            down: window_capacity("time_down", self.time_down, self.sampling_period)?,
        })
    }
}

fn window_capacity(name: &str, window: Duration, sampling: Duration) -> Result<usize, ConfigError> {
    let window_ns = window.as_nanos();
    let sampling_ns = sampling.as_nanos();
    if window_ns == 0 || window_ns % sampling_ns != 0 {
        return Err(ConfigError::Invalid(format!(
            "{name} {window:?} is not a positive multiple of the sampling period {sampling:?}"
        )));
    }
    usize::try_from(window_ns / sampling_ns)
        .map_err(|_| ConfigError::Invalid(format!("{name} {window:?} holds too many samples")))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub beacons_sent: u64,
    pub state_changes: u64,
    pub samples: u64,
    pub decisions: u64,
    pub rejected_notifications: u64,
    pub degenerate_samples: u64,
    pub transport_failures: u64,
}

#[derive(Debug)]
pub struct DccEngine {
    id: EngineId,
    config: EngineConfig,
    fixed_interval: Option<Duration>,
    initial_state: StateId,
    up_window: OccupancyWindow,
    down_window: OccupancyWindow,
    tracker: ChannelOccupancyTracker,
    machine: DccStateMachine,
    beacons: BeaconScheduler,
    measurement: Option<TimerHandle>,
    decision: Option<TimerHandle>,
    rng: StdRng,
    started: bool,
    next_sequence: u64,
    last_ratio: Option<f64>,
    stats: EngineStats,
}

impl DccEngine {
    /// Build an engine whose tracker starts idle at `origin`.
    ///
    /// The state machine is left uninitialized; call [`DccEngine::initialize`]
    /// before [`DccEngine::start`].
    pub fn new(
        id: EngineId,
        config: EngineConfig,
        profile: &DccProfile,
        origin: SimTime,
    ) -> Result<Self, ConfigError> {
        let sizes = config.validate()?;
        Ok(Self {
            id,
            config,
            fixed_interval: profile.fixed_interval(),
            initial_state: profile.initial_state(),
            up_window: OccupancyWindow::new(sizes.up),
            down_window: OccupancyWindow::new(sizes.down),
            tracker: ChannelOccupancyTracker::new(origin),
            machine: DccStateMachine::new(profile),
            beacons: BeaconScheduler::new(),
            measurement: None,
            decision: None,
            rng: StdRng::seed_from_u64(config.seed),
            started: false,
            next_sequence: 0,
            last_ratio: None,
            stats: EngineStats::default(),
        })
    }

    pub fn initialize(&mut self, start: StateId) -> Result<ControlValue, DccError> {
        let control = self.machine.initialize(start)?;
        info!(
            engine_id = self.id,
            state = self.machine.current_state_name().unwrap_or("?"),
            %control,
            "DCC engine initialized"
        );
        Ok(control)
    }

    pub fn initialize_default(&mut self) -> Result<ControlValue, DccError> {
        self.initialize(self.initial_state)
    }

    pub fn start<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<StartPlan, DccError> {
        if !self.machine.is_initialized() {
            return Err(DccError::Uninitialized);
        }
        if self.started {
            return Err(DccError::AlreadyStarted);
        }
        let plan = StartPlan::new(
            now,
            self.config.sampling_period,
            self.config.decision_period,
            &mut self.rng,
        );
        self.measurement = Some(host.schedule_at(plan.measure_at, DccTimer::Measurement));
        self.decision = Some(host.schedule_at(plan.decision_at, DccTimer::Decision));
        self.beacons.arm(plan.decision_at, host);
        self.started = true;
        debug!(
            engine_id = self.id,
            measure_at = ?plan.measure_at,
            decision_at = ?plan.decision_at,
            "DCC timers armed"
        );
        Ok(plan)
    }

    /// Cancel every pending timer. Returns how many were still pending.
    pub fn shutdown<H: DccHost + ?Sized>(&mut self, host: &mut H) -> usize {
        let mut cancelled = 0;
        for handle in [self.measurement.take(), self.decision.take()]
            .into_iter()
            .flatten()
        {
            if host.cancel(handle) {
                cancelled += 1;
            }
        }
        if self.beacons.cancel(host) {
            cancelled += 1;
        }
        if self.started {
            info!(engine_id = self.id, cancelled, "DCC engine stopped");
        }
        self.started = false;
        cancelled
    }

    pub fn on_channel_busy<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<(), DccError> {
        let result = self.tracker.notify_busy(now);
        self.check_notification(now, result, host)
    }

    pub fn on_channel_idle<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<(), DccError> {
        let result = self.tracker.notify_idle(now);
        self.check_notification(now, result, host)
    }

    pub fn on_channel_transition<H: DccHost + ?Sized>(
        &mut self,
        transition: ChannelTransition,
        host: &mut H,
    ) -> Result<(), DccError> {
        match transition.level {
            ChannelLevel::Busy => self.on_channel_busy(transition.at, host),
            ChannelLevel::Idle => self.on_channel_idle(transition.at, host),
        }
    }

    fn check_notification<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        result: Result<(), DccError>,
        host: &mut H,
    ) -> Result<(), DccError> {
        if let Err(err) = &result {
            self.stats.rejected_notifications += 1;
            warn!(engine_id = self.id, at = ?now, error = %err, "rejected channel notification");
            host.anomaly(self.id, now, err);
        }
        result
    }

    /// Sample the tracker and feed both windows. The timer is re-armed first.
    pub fn on_measurement_tick<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<f64, DccError> {
        self.ensure_started()?;
        self.measurement = Some(host.schedule_at(
            now + self.config.sampling_period,
            DccTimer::Measurement,
        ));

        let ratio = match self.tracker.sample(now) {
            Ok(ratio) => ratio,
            Err(err) => {
                if matches!(err, DccError::DegenerateSample { .. }) {
                    self.stats.degenerate_samples += 1;
                }
                warn!(engine_id = self.id, at = ?now, error = %err, "measurement skipped");
                host.anomaly(self.id, now, &err);
                return Err(err);
            }
        };
        self.up_window.insert(ratio)?;
        self.down_window.insert(ratio)?;
        self.stats.samples += 1;
        self.last_ratio = Some(ratio);
        debug!(engine_id = self.id, at = ?now, ratio, "channel busy ratio sampled");
        Ok(ratio)
    }

    /// Run the state machine over the windows. The timer is re-armed first.
    pub fn on_decision_tick<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<Option<StateChange>, DccError> {
        self.ensure_started()?;
        self.decision = Some(host.schedule_at(
            now + self.config.decision_period,
            DccTimer::Decision,
        ));
        self.stats.decisions += 1;

        let bounds = self
            .up_window
            .min()
            .and_then(|min| self.down_window.max().map(|max| (min, max)));
        let (window_min, window_max) = match bounds {
            Ok(bounds) => bounds,
            Err(err) => {
                error!(engine_id = self.id, at = ?now, error = %err, "decision without samples");
                host.anomaly(self.id, now, &err);
                return Err(err);
            }
        };

        let Some(change) = self.machine.decide(window_min, window_max)? else {
            debug!(
                engine_id = self.id,
                window_min,
                window_max,
                state = self.machine.current_state_name().unwrap_or("?"),
                "state unchanged"
            );
            return Ok(None);
        };

        self.stats.state_changes += 1;
        info!(
            engine_id = self.id,
            at = ?now,
            from = change.from,
            to = change.to,
            state = self.machine.current_state_name().unwrap_or("?"),
            control = %change.control,
            window_min,
            window_max,
            "DCC state changed"
        );
        host.state_changed(self.id, now, &change);

        let interval = self.current_interval()?;
        if let Some(at) = self
            .beacons
            .on_state_changed(now, interval, &mut self.rng, host)
        {
            debug!(engine_id = self.id, next_beacon = ?at, "beacon rescheduled");
        }
        Ok(Some(change))
    }

    pub fn on_beacon_tick<H: DccHost + ?Sized>(
        &mut self,
        now: SimTime,
        host: &mut H,
    ) -> Result<Beacon, DccError> {
        self.ensure_started()?;
        let control = self.machine.control_value()?;
        let interval = self.current_interval()?;
        let fired = self
            .beacons
            .on_beacon_fire(now, interval, &mut self.rng, host);

        let beacon = Beacon {
            engine_id: self.id,
            sequence: self.next_sequence,
            at: now,
            control,
        };
        self.next_sequence += 1;
        if let Err(err) = host.emit_beacon(&beacon) {
            self.stats.transport_failures += 1;
            warn!(engine_id = self.id, at = ?now, error = %err, "beacon not delivered");
            host.anomaly(self.id, now, &err);
            return Err(err);
        }
        self.stats.beacons_sent += 1;
        if let Some(gap) = fired.since_last {
            host.beacon_interval(self.id, gap);
        }
        Ok(beacon)
    }

    pub fn dispatch<H: DccHost + ?Sized>(
        &mut self,
        timer: DccTimer,
        now: SimTime,
        host: &mut H,
    ) -> Result<(), DccError> {
        match timer {
            DccTimer::Measurement => self.on_measurement_tick(now, host).map(|_| ()),
            DccTimer::Decision => self.on_decision_tick(now, host).map(|_| ()),
            DccTimer::Beacon => self.on_beacon_tick(now, host).map(|_| ()),
        }
    }

    fn ensure_started(&self) -> Result<(), DccError> {
        if self.started {
            Ok(())
        } else {
            Err(DccError::NotStarted)
        }
    }

    pub fn current_interval(&self) -> Result<Duration, DccError> {
        let control = self.machine.control_value()?;
        match control.beacon_interval().or(self.fixed_interval) {
            Some(interval) => Ok(interval),
            None => Err(DccError::NoControlValue(self.machine.current_state()?)),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn current_state(&self) -> Result<StateId, DccError> {
        self.machine.current_state()
    }

    pub fn current_state_name(&self) -> Option<&str> {
        self.machine.current_state_name()
    }

    pub fn control_value(&self) -> Result<ControlValue, DccError> {
        self.machine.control_value()
    }

    pub fn channel_level(&self) -> ChannelLevel {
        self.tracker.level()
    }

    pub fn last_ratio(&self) -> Option<f64> {
        self.last_ratio
    }

    pub fn next_beacon_at(&self) -> Option<SimTime> {
        self.beacons.pending_fire_time()
    }

    pub fn up_window(&self) -> &OccupancyWindow {
        &self.up_window
    }

    pub fn down_window(&self) -> &OccupancyWindow {
        &self.down_window
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}
