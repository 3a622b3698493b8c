//! Virtual-time timer queue.
//!
//! Timers are keyed by `(due, id)` so entries due at the same instant fire in
//! the order they were scheduled. Nothing here sleeps: a driver advances the
//! clock, either from a real monotonic clock or step by step in tests.

use std::collections::BTreeMap;

/// Handle to one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Ordered queue of pending timers carrying a `T` each.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(u64, TimerId), T>,
    now_ms: u64,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            now_ms: 0,
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Move the clock forward without firing anything. Never moves it back.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Schedule `item` to fire `delay_ms` from now.
    pub fn schedule_in(&mut self, delay_ms: u64, item: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries
            .insert((self.now_ms.saturating_add(delay_ms), id), item);
        id
    }

    /// Cancel one timer; returns its item if it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let key = self.entries.keys().find(|(_, tid)| *tid == id).copied()?;
        self.entries.remove(&key)
    }

    /// Cancel every pending timer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Due time of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Remove and return the earliest timer due at or before `until`.
    ///
    /// The clock moves to that timer's due time, so work done while handling
    /// it (including scheduling follow-up timers) sees the instant it fired.
    pub fn pop_due(&mut self, until: u64) -> Option<(TimerId, T)> {
        let (&(due, id), _) = self.entries.iter().next()?;
        if due > until {
            return None;
        }
        let item = self.entries.remove(&(due, id))?;
        self.set_now(due);
        Some((id, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_then_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule_in(20, "late");
        q.schedule_in(10, "first");
        q.schedule_in(10, "second");

        assert_eq!(q.next_deadline(), Some(10));
        assert_eq!(q.pop_due(100).map(|(_, v)| v), Some("first"));
        assert_eq!(q.now(), 10);
        assert_eq!(q.pop_due(100).map(|(_, v)| v), Some("second"));
        assert_eq!(q.pop_due(15), None);
        assert_eq!(q.pop_due(100).map(|(_, v)| v), Some("late"));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_and_clear() {
        let mut q = TimerQueue::new();
        let a = q.schedule_in(5, 1);
        q.schedule_in(6, 2);

        assert_eq!(q.cancel(a), Some(1));
        assert_eq!(q.cancel(a), None);
        assert_eq!(q.len(), 1);

        q.clear();
        assert_eq!(q.next_deadline(), None);
    }

    #[test]
    fn clock_never_goes_back() {
        let mut q: TimerQueue<()> = TimerQueue::new();
        q.set_now(100);
        q.set_now(50);
        assert_eq!(q.now(), 100);

        q.schedule_in(10, ());
        assert_eq!(q.next_deadline(), Some(110));
    }
}
