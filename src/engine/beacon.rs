use crate::SimTime;
use crate::engine::host::{DccTimer, TimerHandle, TimerService};
use rand::Rng;
use std::time::Duration;

pub const JITTER_MIN: f64 = 1.00;
pub const JITTER_MAX: f64 = 1.01;

/// Upward-only multiplicative jitter that keeps nodes at the same nominal rate apart.
pub fn jitter_factor<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(JITTER_MIN..=JITTER_MAX)
}

pub fn uniform_offset<R: Rng + ?Sized>(rng: &mut R, span: Duration) -> Duration {
    if span.is_zero() {
        return Duration::ZERO;
    }
    span.mul_f64(rng.random_range(0.0..1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPlan {
    pub measure_at: SimTime,
    pub decision_at: SimTime,
}

impl StartPlan {
    pub fn new<R: Rng + ?Sized>(
        now: SimTime,
        sampling_period: Duration,
        decision_period: Duration,
        rng: &mut R,
    ) -> Self {
        let measure_at = now + uniform_offset(rng, sampling_period);
        let decision_at =
            measure_at + uniform_offset(rng, decision_period.saturating_sub(sampling_period));
        Self {
            measure_at,
            decision_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingBeacon {
    handle: TimerHandle,
    at: SimTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconFired {
    pub since_last: Option<Duration>,
    pub next_fire: SimTime,
}

#[derive(Debug, Clone, Default)]
pub struct BeaconScheduler {
    pending: Option<PendingBeacon>,
    last_emission: Option<SimTime>,
}

impl BeaconScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_fire_time(&self) -> Option<SimTime> {
        self.pending.map(|pending| pending.at)
    }

    pub fn last_emission_time(&self) -> Option<SimTime> {
        self.last_emission
    }

    pub fn arm<T: TimerService + ?Sized>(&mut self, at: SimTime, timers: &mut T) {
        self.cancel(timers);
        let handle = timers.schedule_at(at, DccTimer::Beacon);
        self.pending = Some(PendingBeacon { handle, at });
    }

    pub fn cancel<T: TimerService + ?Sized>(&mut self, timers: &mut T) -> bool {
        match self.pending.take() {
            Some(pending) => timers.cancel(pending.handle),
            None => false,
        }
    }

    pub fn on_beacon_fire<R, T>(
        &mut self,
        now: SimTime,
        interval: Duration,
        rng: &mut R,
        timers: &mut T,
    ) -> BeaconFired
    where
        R: Rng + ?Sized,
        T: TimerService + ?Sized,
    {
        // The firing timer is no longer pending.
        self.pending = None;
        let since_last = self
            .last_emission
            .and_then(|last| now.checked_sub(last));
        self.last_emission = Some(now);

        let next_fire = now + interval.mul_f64(jitter_factor(rng));
        self.arm(next_fire, timers);
        BeaconFired {
            since_last,
            next_fire,
        }
    }

    /// Move a pending beacon to follow the previous emission by the new interval.
    ///
    /// Never lands before `now`. Before the first emission the already armed fire
    /// time is kept. Returns the new fire time, or `None` if nothing was pending.
    pub fn on_state_changed<R, T>(
        &mut self,
        now: SimTime,
        new_interval: Duration,
        rng: &mut R,
        timers: &mut T,
    ) -> Option<SimTime>
    where
        R: Rng + ?Sized,
        T: TimerService + ?Sized,
    {
        let pending = self.pending?;
        let follow_up = match self.last_emission {
            Some(last) => last + new_interval.mul_f64(jitter_factor(rng)),
            None => pending.at,
        };
        let at = follow_up.max(now);
        self.arm(at, timers);
        Some(at)
    }
}
