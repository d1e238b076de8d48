//! Alive and blocked lists
//!
//! Both lists hold `CoroutineId` handles in FIFO order; the contexts
//! themselves live in the `ContextTable`. Membership is exclusive, which the
//! engine keeps by always removing from one list before pushing to the other.

use std::collections::VecDeque;

use coroswap_core::id::CoroutineId;

use crate::config::SchedPolicy;

/// FIFO list of coroutine handles
#[derive(Debug, Default)]
pub struct RunQueue {
    queue: VecDeque<CoroutineId>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    #[inline]
    pub fn push_back(&mut self, id: CoroutineId) {
        debug_assert!(!self.contains(id), "{:?} queued twice", id);
        self.queue.push_back(id);
    }

    /// Remove `id` wherever it sits; false if it was not queued
    pub fn remove(&mut self, id: CoroutineId) -> bool {
        match self.queue.iter().position(|&queued| queued == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn front(&self) -> Option<CoroutineId> {
        self.queue.front().copied()
    }

    #[inline]
    fn contains(&self, id: CoroutineId) -> bool {
        self.queue.contains(&id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the only queued handle is `id`
    #[inline]
    pub fn holds_only(&self, id: CoroutineId) -> bool {
        self.queue.len() == 1 && self.queue[0] == id
    }

    /// Pick who runs after `current` yields
    ///
    /// `None` when nothing but `current` is queued. Under `RoundRobin` the
    /// yielder first moves to the tail; under `HeadFirst` the order is left
    /// alone and a yielder sitting at the head is skipped.
    pub fn next_after(&mut self, current: CoroutineId, policy: SchedPolicy) -> Option<CoroutineId> {
        if self.queue.is_empty() || self.holds_only(current) {
            return None;
        }

        match policy {
            SchedPolicy::RoundRobin => {
                if self.remove(current) {
                    self.queue.push_back(current);
                }
                self.front()
            }
            SchedPolicy::HeadFirst => {
                let mut candidates = self.queue.iter().copied();
                match candidates.next() {
                    Some(head) if head == current => candidates.next(),
                    head => head,
                }
            }
        }
    }

    /// Take every handle out, head first
    pub fn drain(&mut self) -> Vec<CoroutineId> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = CoroutineId> + '_ {
        self.queue.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u32) -> Vec<CoroutineId> {
        (0..n).map(|i| CoroutineId::new(i, 0)).collect()
    }

    fn queue_of(ids: &[CoroutineId]) -> RunQueue {
        let mut queue = RunQueue::new();
        for &id in ids {
            queue.push_back(id);
        }
        queue
    }

    #[test]
    fn test_fifo_and_remove() {
        let ids = ids(3);
        let mut queue = queue_of(&ids);

        assert_eq!(queue.front(), Some(ids[0]));
        assert!(queue.remove(ids[1]));
        assert!(!queue.remove(ids[1]));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![ids[0], ids[2]]);
        assert_eq!(queue.drain(), vec![ids[0], ids[2]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_only_current_is_noop() {
        let ids = ids(1);
        let mut queue = queue_of(&ids);

        assert!(queue.holds_only(ids[0]));
        assert_eq!(queue.next_after(ids[0], SchedPolicy::RoundRobin), None);
        assert_eq!(queue.next_after(ids[0], SchedPolicy::HeadFirst), None);
        assert_eq!(RunQueue::new().next_after(ids[0], SchedPolicy::RoundRobin), None);
    }

    #[test]
    fn test_round_robin_rotates_yielder() {
        let ids = ids(3);
        let mut queue = queue_of(&ids);

        assert_eq!(queue.next_after(ids[0], SchedPolicy::RoundRobin), Some(ids[1]));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![ids[1], ids[2], ids[0]]);
        assert_eq!(queue.next_after(ids[1], SchedPolicy::RoundRobin), Some(ids[2]));
        assert_eq!(queue.next_after(ids[2], SchedPolicy::RoundRobin), Some(ids[0]));
    }

    #[test]
    fn test_head_first_skips_current_head() {
        let ids = ids(3);
        let mut queue = queue_of(&ids);

        assert_eq!(queue.next_after(ids[0], SchedPolicy::HeadFirst), Some(ids[1]));
        assert_eq!(queue.next_after(ids[1], SchedPolicy::HeadFirst), Some(ids[0]));
        // Order untouched
        assert_eq!(queue.iter().collect::<Vec<_>>(), ids);
    }

    #[test]
    fn test_next_after_from_outside() {
        // Idle is never queued: the head is picked as is
        let ids = ids(2);
        let mut queue = queue_of(&ids);
        assert_eq!(queue.next_after(CoroutineId::NONE, SchedPolicy::RoundRobin), Some(ids[0]));
        assert_eq!(queue.next_after(CoroutineId::NONE, SchedPolicy::HeadFirst), Some(ids[0]));
    }
}
