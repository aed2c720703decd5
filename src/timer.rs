use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    rc::Rc,
    time::{Duration, Instant},
};

use crate::handler::EventHandler;

/// Identifies an armed one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// An entry in the timer heap.
///
/// The comparison is reversed so that `BinaryHeap<TimerEntry>` pops the
/// earliest deadline first. Ties are broken by id, so timers armed with equal
/// deadlines fire in arming order.
struct TimerEntry {
    deadline: Instant,
    id: TimerId,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deadline-ordered set of one-shot callbacks.
///
/// Cancellation removes the handler from the lookup table; the heap entry is
/// left behind and skipped when it surfaces.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    handlers: HashMap<TimerId, Rc<dyn EventHandler>>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deadline: Instant, handler: Rc<dyn EventHandler>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.heap.push(TimerEntry { deadline, id });
        self.handlers.insert(id, handler);
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Time left until the earliest live deadline, if any.
    pub fn next_timeout(&mut self, now: Instant) -> Option<Duration> {
        self.discard_cancelled();
        self.heap
            .peek()
            .map(|entry| entry.deadline.saturating_duration_since(now))
    }

    /// Removes and returns the next expired timer.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TimerId, Rc<dyn EventHandler>)> {
        self.discard_cancelled();
        if self.heap.peek()?.deadline > now {
            return None;
        }
        let entry = self.heap.pop()?;
        let handler = self.handlers.remove(&entry.id)?;
        Some((entry.id, handler))
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.handlers.contains_key(&entry.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
