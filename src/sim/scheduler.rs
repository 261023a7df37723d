//! Discrete-event timeline.
//!
//! Events are kept in a priority queue ordered by fire time, ties broken by
//! scheduling order. Cancellation removes the event from the pending map; the
//! stale heap slot is skipped when it reaches the top, so a canceled event can
//! never fire.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Simulated time since the start of the run.
pub type SimTime = Duration;

/// Handle to a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// The view of the timeline a routing protocol needs: schedule, cancel and
/// inspect its own callbacks.
pub trait TimerQueue<E> {
    fn now(&self) -> SimTime;

    fn schedule(&mut self, delay: Duration, event: E) -> EventId;

    /// Canceling an event that already fired (or was canceled) is a no-op.
    fn cancel(&mut self, id: EventId);

    fn is_pending(&self, id: EventId) -> bool;

    /// Time left before `id` fires, zero when it is no longer pending.
    fn delay_left(&self, id: EventId) -> Duration;
}

#[derive(Debug)]
struct PendingEvent<E> {
    fire_at: SimTime,
    event: E,
}

#[derive(Debug)]
pub struct Scheduler<E> {
    now: SimTime,
    next_id: u64,
    queue: BinaryHeap<Reverse<(SimTime, EventId)>>,
    pending: HashMap<EventId, PendingEvent<E>>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pops the next event due at or before `until` and advances the clock to it.
    pub fn pop_due(&mut self, until: SimTime) -> Option<(EventId, E)> {
        self.discard_canceled();

        let Reverse((fire_at, id)) = *self.queue.peek()?;
        if fire_at > until {
            return None;
        }

        self.queue.pop();
        let pending = self.pending.remove(&id)?;
        self.now = pending.fire_at;
        Some((id, pending.event))
    }

    /// Moves the clock forward without firing anything. Never goes backwards.
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    fn discard_canceled(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.pending.contains_key(id) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl<E> TimerQueue<E> for Scheduler<E> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, delay: Duration, event: E) -> EventId {
        self.next_id += 1;
        let id = EventId(self.next_id);
        let fire_at = self.now + delay;

        self.queue.push(Reverse((fire_at, id)));
        self.pending.insert(id, PendingEvent { fire_at, event });
        id
    }

    fn cancel(&mut self, id: EventId) {
        self.pending.remove(&id);
    }

    fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains_key(&id)
    }

    fn delay_left(&self, id: EventId) -> Duration {
        self.pending
            .get(&id)
            .map(|p| p.fire_at.saturating_sub(self.now))
            .unwrap_or(Duration::ZERO)
    }
}
