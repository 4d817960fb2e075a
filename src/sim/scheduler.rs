//! Deterministic discrete-event queue.
//!
//! Events are processed in this order:
//! 1. Timestamp (earlier first)
//! 2. Event kind, so medium activity at an instant lands before timers
//! 3. For timers: measurement, decision, beacon; then node id
//! 4. Insertion order

use crate::SimTime;
use crate::engine::{DccTimer, EngineId, TimerHandle};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimEvent {
    TransmissionEnd { node: EngineId },
    BackgroundBurstEnd,
    BackgroundBurstStart,
    Timer {
        timer: DccTimer,
        node: EngineId,
        handle: TimerHandle,
    },
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    at: SimTime,
    event: SimEvent,
    id: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reversed so the earliest event is on top.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.event.cmp(&self.event))
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: SimTime,
    queue: BinaryHeap<Scheduled>,
    next_id: u64,
    /// Timers still live; cancelled ones are dropped lazily when they surface.
    live_timers: HashSet<TimerHandle>,
    processed: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn schedule(&mut self, at: SimTime, event: SimEvent) {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Scheduled {
            at: at.max(self.now),
            event,
            id,
        });
    }

    pub fn schedule_timer(&mut self, at: SimTime, node: EngineId, timer: DccTimer) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id);
        self.live_timers.insert(handle);
        self.schedule(at, SimEvent::Timer {
            timer,
            node,
            handle,
        });
        handle
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.live_timers.remove(&handle)
    }

    pub fn live_timers(&self) -> usize {
        self.live_timers.len()
    }

    fn discard_cancelled(&mut self) {
        while let Some(head) = self.queue.peek() {
            match head.event {
                SimEvent::Timer { handle, .. } if !self.live_timers.contains(&handle) => {
                    self.queue.pop();
                }
                _ => break,
            }
        }
    }

    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.discard_cancelled();
        self.queue.peek().map(|head| head.at)
    }

    pub fn pop_until(&mut self, until: SimTime) -> Option<(SimTime, SimEvent)> {
        if self.peek_time()? > until {
            return None;
        }
        let next = self.queue.pop()?;
        if let SimEvent::Timer { handle, .. } = next.event {
            self.live_timers.remove(&handle);
        }
        self.now = next.at;
        self.processed += 1;
        Some((next.at, next.event))
    }

    pub fn advance_to(&mut self, to: SimTime) {
        self.now = self.now.max(to);
    }
}
