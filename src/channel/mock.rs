use crate::SimTime;
use crate::channel::{ChannelLevel, ChannelSensor, ChannelTransition};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel {
    transitions: VecDeque<ChannelTransition>,
}

impl ScriptedChannel {
    pub fn new(transitions: Vec<ChannelTransition>) -> Self {
        Self {
            transitions: transitions.into(),
        }
    }

    /// Build a script from consecutive `(level, length)` segments starting at `start`.
    ///
    /// The medium is assumed idle before `start`; adjacent segments with the
    /// same level are merged so the script always alternates.
    pub fn from_segments(start: SimTime, segments: &[(ChannelLevel, Duration)]) -> Self {
        let mut transitions = Vec::new();
        let mut current = ChannelLevel::Idle;
        let mut at = start;
        for (level, length) in segments {
            if *level != current {
                transitions.push(ChannelTransition { at, level: *level });
                current = *level;
            }
            at += *length;
        }
        Self::new(transitions)
    }

    /// Periodic activity: busy for `ratio` of every `period`, for `cycles` periods.
    pub fn duty_cycle(start: SimTime, period: Duration, ratio: f64, cycles: u32) -> Self {
        let busy = period.mul_f64(ratio.clamp(0.0, 1.0));
        let idle = period.saturating_sub(busy);
        let mut segments = Vec::with_capacity(cycles as usize * 2);
        for _ in 0..cycles {
            segments.push((ChannelLevel::Busy, busy));
            segments.push((ChannelLevel::Idle, idle));
        }
        segments.retain(|(_, length)| !length.is_zero());
        Self::from_segments(start, &segments)
    }

    pub fn remaining(&self) -> usize {
        self.transitions.len()
    }
}

impl ChannelSensor for ScriptedChannel {
    fn next_transition(&mut self) -> Option<ChannelTransition> {
        self.transitions.pop_front()
    }

    fn peek_time(&self) -> Option<SimTime> {
        self.transitions.front().map(|transition| transition.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_merge_into_alternating_flips() {
        let mut channel = ScriptedChannel::from_segments(
            SimTime::ZERO,
            &[
                (ChannelLevel::Busy, Duration::from_millis(100)),
                (ChannelLevel::Busy, Duration::from_millis(100)),
                (ChannelLevel::Idle, Duration::from_millis(300)),
                (ChannelLevel::Busy, Duration::from_millis(50)),
            ],
        );

        assert_eq!(
            channel.next_transition(),
            Some(ChannelTransition::busy(SimTime::ZERO))
        );
        assert_eq!(
            channel.next_transition(),
            Some(ChannelTransition::idle(Duration::from_millis(200)))
        );
        assert_eq!(
            channel.next_transition(),
            Some(ChannelTransition::busy(Duration::from_millis(500)))
        );
        assert_eq!(channel.next_transition(), None);
    }

    #[test]
    fn drain_stops_at_deadline() {
        let mut channel = ScriptedChannel::duty_cycle(
            SimTime::ZERO,
            Duration::from_millis(100),
            0.2,
            10,
        );

        let drained = channel.drain_until(Duration::from_millis(250));

        // busy@0, idle@20, busy@100, idle@120, busy@200, idle@220
        assert_eq!(drained.len(), 6);
        assert_eq!(channel.peek_time(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn fully_idle_duty_cycle_has_no_flips() {
        let channel = ScriptedChannel::duty_cycle(SimTime::ZERO, Duration::from_secs(1), 0.0, 5);
        assert_eq!(channel.remaining(), 0);
    }
}
