//! Shared broadcast medium heard identically by every node.
//!
//! Overlapping transmissions merge into one busy period. Every busy/idle flip
//! is queued and handed out through [`ChannelSensor`], so the caller can
//! forward it to each engine once the current handler has returned.

use crate::SimTime;
use crate::channel::{ChannelLevel, ChannelSensor, ChannelTransition};
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_BITRATE_MBPS: f64 = 6.0;

/// Time on air for `bits` at `mbps`, including the PHY preamble.
pub fn airtime(bits: u64, mbps: f64, preamble: Duration) -> Duration {
    preamble + Duration::from_secs_f64(bits as f64 / (mbps * 1e6))
}

#[derive(Debug, Default)]
pub struct Medium {
    active: u32,
    busy_since: Option<SimTime>,
    busy_total: Duration,
    flips: VecDeque<ChannelTransition>,
    transmissions: u64,
}

impl Medium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> ChannelLevel {
        if self.active > 0 {
            ChannelLevel::Busy
        } else {
            ChannelLevel::Idle
        }
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    pub fn begin(&mut self, at: SimTime) {
        self.active += 1;
        self.transmissions += 1;
        if self.active == 1 {
            self.busy_since = Some(at);
            self.flips.push_back(ChannelTransition::busy(at));
        }
    }

    pub fn end(&mut self, at: SimTime) {
        if self.active == 0 {
            return;
        }
        self.active -= 1;
        if self.active == 0 {
            if let Some(since) = self.busy_since.take() {
                self.busy_total += at.saturating_sub(since);
            }
            self.flips.push_back(ChannelTransition::idle(at));
        }
    }

    /// Fraction of `[0, now]` the channel has been busy.
    pub fn busy_ratio(&self, now: SimTime) -> f64 {
        if now.is_zero() {
            return 0.0;
        }
        let open = self
            .busy_since
            .map(|since| now.saturating_sub(since))
            .unwrap_or_default();
        (self.busy_total + open).as_secs_f64() / now.as_secs_f64()
    }
}

impl ChannelSensor for Medium {
    fn next_transition(&mut self) -> Option<ChannelTransition> {
        self.flips.pop_front()
    }

    fn peek_time(&self) -> Option<SimTime> {
        self.flips.front().map(|flip| flip.at)
    }
}
