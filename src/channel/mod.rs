use crate::SimTime;

pub mod mock;
pub mod tracker;

pub use tracker::ChannelOccupancyTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLevel {
    Idle,
    Busy,
}

impl ChannelLevel {
    pub fn flipped(self) -> Self {
        match self {
            Self::Idle => Self::Busy,
            Self::Busy => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTransition {
    pub at: SimTime,
    pub level: ChannelLevel,
}

impl ChannelTransition {
    pub fn busy(at: SimTime) -> Self {
        Self {
            at,
            level: ChannelLevel::Busy,
        }
    }

    pub fn idle(at: SimTime) -> Self {
        Self {
            at,
            level: ChannelLevel::Idle,
        }
    }
}

/// Source of busy/idle transitions for one receiver.
///
/// Implementors yield transitions in non-decreasing time order. The host drains
/// the sensor and forwards each transition to the engine.
pub trait ChannelSensor {
    fn next_transition(&mut self) -> Option<ChannelTransition>;

    fn drain_until(&mut self, until: SimTime) -> Vec<ChannelTransition> {
        let mut drained = Vec::new();
        while let Some(next) = self.peek_time() {
            if next > until {
                break;
            }
            match self.next_transition() {
                Some(transition) => drained.push(transition),
                None => break,
            }
        }
        drained
    }

    fn peek_time(&self) -> Option<SimTime>;
}
