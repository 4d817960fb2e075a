//! Busy/idle bookkeeping for the channel busy ratio.

use crate::SimTime;
use crate::channel::ChannelLevel;
use crate::error::DccError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ChannelOccupancyTracker {
    busy_accum: Duration,
    idle_accum: Duration,
    /// Start of the open segment; `level` says whether it is busy or idle.
    segment_start: SimTime,
    level: ChannelLevel,
    last_totals: (Duration, Duration),
    last_sample_at: SimTime,
    origin: SimTime,
}

impl ChannelOccupancyTracker {
    pub fn new(origin: SimTime) -> Self {
        Self {
            busy_accum: Duration::ZERO,
            idle_accum: Duration::ZERO,
            segment_start: origin,
            level: ChannelLevel::Idle,
            last_totals: (Duration::ZERO, Duration::ZERO),
            last_sample_at: origin,
            origin,
        }
    }

    pub fn level(&self) -> ChannelLevel {
        self.level
    }

    pub fn origin(&self) -> SimTime {
        self.origin
    }

    pub fn notify_busy(&mut self, at: SimTime) -> Result<(), DccError> {
        self.transition(at, ChannelLevel::Busy)
    }

    pub fn notify_idle(&mut self, at: SimTime) -> Result<(), DccError> {
        self.transition(at, ChannelLevel::Idle)
    }

    fn transition(&mut self, at: SimTime, to: ChannelLevel) -> Result<(), DccError> {
        if self.level == to {
            return Err(DccError::OrderingViolation {
                expected: to.flipped(),
                got: to,
                at,
            });
        }
        // Time up to the last sample is already accounted for.
        if at < self.last_sample_at {
            return Err(DccError::TimeReversal {
                at,
                previous: self.last_sample_at,
            });
        }
        let elapsed = self.open_segment_length(at)?;
        match self.level {
            ChannelLevel::Busy => self.busy_accum += elapsed,
            ChannelLevel::Idle => self.idle_accum += elapsed,
        }
        self.segment_start = at;
        self.level = to;
        Ok(())
    }

    fn open_segment_length(&self, at: SimTime) -> Result<Duration, DccError> {
        at.checked_sub(self.segment_start)
            .ok_or(DccError::TimeReversal {
                at,
                previous: self.segment_start,
            })
    }

    pub fn totals_at(&self, now: SimTime) -> Result<(Duration, Duration), DccError> {
        let open = self.open_segment_length(now)?;
        Ok(match self.level {
            ChannelLevel::Busy => (self.busy_accum + open, self.idle_accum),
            ChannelLevel::Idle => (self.busy_accum, self.idle_accum + open),
        })
    }

    /// Busy ratio over the interval since the previous sample.
    ///
    /// A zero-length interval yields `DegenerateSample` and leaves the snapshot
    /// untouched, so the next sample still covers the whole interval.
    pub fn sample(&mut self, now: SimTime) -> Result<f64, DccError> {
        if now < self.last_sample_at {
            return Err(DccError::TimeReversal {
                at: now,
                previous: self.last_sample_at,
            });
        }
        let (busy, idle) = self.totals_at(now)?;
        let (last_busy, last_idle) = self.last_totals;

        let busy_delta = busy.saturating_sub(last_busy);
        let total_delta = (busy + idle).saturating_sub(last_busy + last_idle);
        if total_delta.is_zero() {
            return Err(DccError::DegenerateSample { at: now });
        }

        self.last_totals = (busy, idle);
        self.last_sample_at = now;
        Ok(busy_delta.as_nanos() as f64 / total_delta.as_nanos() as f64)
    }
}
