//! Reference host: several engines sharing one medium, driven by one event queue.

use crate::SimTime;
use crate::channel::ChannelSensor;
use crate::dcc::data_rate::bitrate_for_mcs;
use crate::dcc::{ControlValue, DccProfile, StateChange};
use crate::engine::{
    Beacon, BeaconTransport, DccEngine, DccObserver, DccTimer, EngineConfig, EngineId,
    TimerHandle, TimerService,
};
use crate::error::{AppError, DccError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod medium;
pub mod scheduler;

pub use medium::Medium;
pub use scheduler::{Scheduler, SimEvent};

const BACKGROUND_SEED_SALT: u64 = 0x5eed_b0a7;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub nodes: u32,
    pub beacon_bits: u64,
    pub preamble: Duration,
    /// Extra busy fraction produced by random bursts; 0 disables them.
    pub background_load: f64,
    pub background_burst: Duration,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            beacon_bits: 3200,
            preamble: Duration::from_micros(40),
            background_load: 0.0,
            background_burst: Duration::from_millis(2),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    gaps: u64,
    gap_total: Duration,
    anomalies: u64,
    last_change_at: Option<SimTime>,
}

struct NodeContext<'a> {
    node: EngineId,
    scheduler: &'a mut Scheduler,
    medium: &'a mut Medium,
    record: &'a mut NodeRecord,
    beacon_bits: u64,
    preamble: Duration,
}

impl TimerService for NodeContext<'_> {
    fn schedule_at(&mut self, at: SimTime, timer: DccTimer) -> TimerHandle {
        self.scheduler.schedule_timer(at, self.node, timer)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.scheduler.cancel_timer(handle)
    }
}

impl BeaconTransport for NodeContext<'_> {
    fn emit_beacon(&mut self, beacon: &Beacon) -> Result<(), DccError> {
        let mbps = match beacon.control {
            ControlValue::DataRate { mcs } => bitrate_for_mcs(mcs)
                .ok_or_else(|| DccError::Transport(format!("no bitrate for mcs {mcs}")))?,
            _ => medium::DEFAULT_BITRATE_MBPS,
        };
        let ends_at = beacon.at + medium::airtime(self.beacon_bits, mbps, self.preamble);
        self.medium.begin(beacon.at);
        self.scheduler
            .schedule(ends_at, SimEvent::TransmissionEnd { node: self.node });
        Ok(())
    }
}

impl DccObserver for NodeContext<'_> {
    fn beacon_interval(&mut self, _engine: EngineId, interval: Duration) {
        self.record.gaps += 1;
        self.record.gap_total += interval;
    }

    fn state_changed(&mut self, _engine: EngineId, at: SimTime, _change: &StateChange) {
        self.record.last_change_at = Some(at);
    }

    fn anomaly(&mut self, _engine: EngineId, _at: SimTime, _error: &DccError) {
        self.record.anomalies += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub node: EngineId,
    pub state: String,
    pub control: Option<String>,
    pub beacon_interval_ms: Option<f64>,
    pub mean_beacon_gap_ms: Option<f64>,
    pub last_busy_ratio: Option<f64>,
    pub last_change_secs: Option<f64>,
    pub beacons_sent: u64,
    pub state_changes: u64,
    pub rejected_notifications: u64,
    pub anomalies: u64,
}

pub struct Simulation {
    config: SimulationConfig,
    engines: Vec<DccEngine>,
    records: Vec<NodeRecord>,
    scheduler: Scheduler,
    medium: Medium,
    rng: StdRng,
    started: bool,
}

impl Simulation {
    /// Build one initialized engine per node; node `n` seeds its jitter with `seed + n`.
    pub fn new(
        config: SimulationConfig,
        engine: EngineConfig,
        profile: &DccProfile,
    ) -> Result<Self, AppError> {
        let mut engines = Vec::with_capacity(config.nodes as usize);
        for node in 0..config.nodes {
            let node_config = EngineConfig {
                seed: engine.seed.wrapping_add(u64::from(node)),
                ..engine
            };
            let mut dcc = DccEngine::new(node, node_config, profile, SimTime::ZERO)?;
            dcc.initialize_default()?;
            engines.push(dcc);
        }
        let records = vec![NodeRecord::default(); engines.len()];
        let rng = StdRng::seed_from_u64(config.seed ^ BACKGROUND_SEED_SALT);
        Ok(Self {
            config,
            engines,
            records,
            scheduler: Scheduler::new(),
            medium: Medium::new(),
            rng,
            started: false,
        })
    }

    pub fn start(&mut self) -> Result<(), AppError> {
        if self.started {
            return Err(DccError::AlreadyStarted.into());
        }
        let now = self.scheduler.now();
        for (engine, record) in self.engines.iter_mut().zip(self.records.iter_mut()) {
            let mut host = NodeContext {
                node: engine.id(),
                scheduler: &mut self.scheduler,
                medium: &mut self.medium,
                record,
                beacon_bits: self.config.beacon_bits,
                preamble: self.config.preamble,
            };
            engine.start(now, &mut host)?;
        }
        if self.config.background_load > 0.0 {
            self.schedule_background(now);
        }
        self.started = true;
        info!(
            nodes = self.engines.len(),
            background_load = self.config.background_load,
            "simulation started"
        );
        Ok(())
    }

    /// Process every event up to and including `until`. Returns how many ran.
    pub fn run_until(&mut self, until: SimTime) -> u64 {
        let before = self.scheduler.processed();
        while let Some((at, event)) = self.scheduler.pop_until(until) {
            match event {
                SimEvent::Timer { timer, node, .. } => self.fire_timer(node, timer, at),
                SimEvent::TransmissionEnd { .. } => self.medium.end(at),
                SimEvent::BackgroundBurstStart => {
                    self.medium.begin(at);
                    self.scheduler
                        .schedule(at + self.config.background_burst, SimEvent::BackgroundBurstEnd);
                }
                SimEvent::BackgroundBurstEnd => {
                    self.medium.end(at);
                    self.schedule_background(at);
                }
            }
            self.deliver_flips(at);
        }
        self.scheduler.advance_to(until);
        self.scheduler.processed() - before
    }

    pub fn shutdown(&mut self) -> usize {
        let mut cancelled = 0;
        for (engine, record) in self.engines.iter_mut().zip(self.records.iter_mut()) {
            let mut host = NodeContext {
                node: engine.id(),
                scheduler: &mut self.scheduler,
                medium: &mut self.medium,
                record,
                beacon_bits: self.config.beacon_bits,
                preamble: self.config.preamble,
            };
            cancelled += engine.shutdown(&mut host);
        }
        self.started = false;
        info!(cancelled, "simulation stopped");
        cancelled
    }

    fn fire_timer(&mut self, node: EngineId, timer: DccTimer, at: SimTime) {
        let index = node as usize;
        let (Some(engine), Some(record)) =
            (self.engines.get_mut(index), self.records.get_mut(index))
        else {
            warn!(node, ?timer, "timer for unknown node dropped");
            return;
        };
        let mut host = NodeContext {
            node,
            scheduler: &mut self.scheduler,
            medium: &mut self.medium,
            record,
            beacon_bits: self.config.beacon_bits,
            preamble: self.config.preamble,
        };
        if let Err(err) = engine.dispatch(timer, at, &mut host) {
            debug!(node, ?timer, error = %err, "timer handler failed");
        }
    }

    fn deliver_flips(&mut self, now: SimTime) {
        for flip in self.medium.drain_until(now) {
            for (engine, record) in self.engines.iter_mut().zip(self.records.iter_mut()) {
                let mut host = NodeContext {
                    node: engine.id(),
                    scheduler: &mut self.scheduler,
                    medium: &mut self.medium,
                    record,
                    beacon_bits: self.config.beacon_bits,
                    preamble: self.config.preamble,
                };
                if let Err(err) = engine.on_channel_transition(flip, &mut host) {
                    debug!(node = engine.id(), error = %err, "channel flip rejected");
                }
            }
        }
    }

    fn schedule_background(&mut self, after: SimTime) {
        let load = self.config.background_load;
        if load <= 0.0 || load >= 1.0 {
            return;
        }
        let mean_gap = self.config.background_burst.mul_f64((1.0 - load) / load);
        let gap = mean_gap.mul_f64(self.rng.random_range(0.0..2.0));
        self.scheduler
            .schedule(after + gap, SimEvent::BackgroundBurstStart);
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn nodes(&self) -> usize {
        self.engines.len()
    }

    pub fn engine(&self, node: EngineId) -> Option<&DccEngine> {
        self.engines.get(node as usize)
    }

    pub fn live_timers(&self) -> usize {
        self.scheduler.live_timers()
    }

    /// Ground-truth busy fraction of the medium since time zero.
    pub fn channel_busy_ratio(&self) -> f64 {
        self.medium.busy_ratio(self.scheduler.now())
    }

    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.engines
            .iter()
            .zip(&self.records)
            .map(|(engine, record)| {
                let stats = engine.stats();
                NodeSummary {
                    node: engine.id(),
                    state: engine
                        .current_state_name()
                        .unwrap_or("uninitialized")
                        .to_string(),
                    control: engine.control_value().ok().map(|control| control.to_string()),
                    beacon_interval_ms: engine
                        .current_interval()
                        .ok()
                        .map(|interval| interval.as_secs_f64() * 1e3),
                    mean_beacon_gap_ms: (record.gaps > 0).then(|| {
                        record.gap_total.as_secs_f64() * 1e3 / record.gaps as f64
                    }),
                    last_busy_ratio: engine.last_ratio(),
                    last_change_secs: record.last_change_at.map(|at| at.as_secs_f64()),
                    beacons_sent: stats.beacons_sent,
                    state_changes: stats.state_changes,
                    rejected_notifications: stats.rejected_notifications,
                    anomalies: record.anomalies,
                }
            })
            .collect()
    }
}
