//! FIFO waiting pool with O(1) removal by participant.
//!
//! The pool is a doubly-linked list threaded through a `HashMap` keyed by
//! participant id: every queued participant owns one [`Link`] pointing at its
//! neighbours. Enqueue, dequeue and arbitrary removal are all O(1), and the
//! map doubles as the uniqueness index.

use std::collections::HashMap;

use crate::error::PoolError;
use crate::types::ParticipantId;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: Option<ParticipantId>,
    next: Option<ParticipantId>,
}

#[derive(Debug, Default)]
pub struct WaitingPool {
    links: HashMap<ParticipantId, Link>,
    head: Option<ParticipantId>,
    tail: Option<ParticipantId>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` at the tail.
    ///
    /// Callers remove `id` first; a participant already queued is rejected
    /// and the pool is left untouched.
    pub fn enqueue(&mut self, id: ParticipantId) -> Result<(), PoolError> {
        if self.links.contains_key(&id) {
            return Err(PoolError::AlreadyQueued(id));
        }

        let link = Link {
            prev: self.tail,
            next: None,
        };
        match self.tail.and_then(|tail| self.links.get_mut(&tail)) {
            Some(tail_link) => tail_link.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.links.insert(id, link);
        Ok(())
    }

    /// Remove and return the oldest participant.
    pub fn dequeue(&mut self) -> Result<ParticipantId, PoolError> {
        let head = self.head.ok_or(PoolError::Empty)?;
        self.remove(head);
        Ok(head)
    }

    /// Remove `id` wherever it sits. Returns whether it was queued.
    pub fn remove(&mut self, id: ParticipantId) -> bool {
        let Some(link) = self.links.remove(&id) else {
            return false;
        };

        match link.prev.and_then(|prev| self.links.get_mut(&prev)) {
            Some(prev_link) => prev_link.next = link.next,
            None => self.head = link.next,
        }
        match link.next.and_then(|next| self.links.get_mut(&next)) {
            Some(next_link) => next_link.prev = link.prev,
            None => self.tail = link.prev,
        }
        true
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.links.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            pool: self,
            cursor: self.head,
        }
    }
}

pub struct Iter<'a> {
    pool: &'a WaitingPool,
    cursor: Option<ParticipantId>,
}

impl Iterator for Iter<'_> {
    type Item = ParticipantId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = self.pool.links.get(&current).and_then(|link| link.next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pool: &WaitingPool) -> Vec<i64> {
        pool.iter().map(|id| id.0).collect()
    }

    fn pool_of(values: &[i64]) -> WaitingPool {
        let mut pool = WaitingPool::new();
        for v in values {
            pool.enqueue(ParticipantId(*v)).unwrap();
        }
        pool
    }

    #[test]
    fn test_dequeue_is_fifo() {
        let mut pool = pool_of(&[1, 2, 3]);
        assert_eq!(pool.dequeue(), Ok(ParticipantId(1)));
        assert_eq!(pool.dequeue(), Ok(ParticipantId(2)));
        assert_eq!(pool.dequeue(), Ok(ParticipantId(3)));
        assert_eq!(pool.dequeue(), Err(PoolError::Empty));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_dequeue_empty() {
        let mut pool = WaitingPool::new();
        assert_eq!(pool.dequeue(), Err(PoolError::Empty));
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let mut pool = pool_of(&[1, 2]);
        assert_eq!(
            pool.enqueue(ParticipantId(1)),
            Err(PoolError::AlreadyQueued(ParticipantId(1)))
        );
        assert_eq!(ids(&pool), vec![1, 2]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_remove_middle_head_and_tail() {
        let mut pool = pool_of(&[1, 2, 3, 4]);

        assert!(pool.remove(ParticipantId(2)));
        assert_eq!(ids(&pool), vec![1, 3, 4]);

        assert!(pool.remove(ParticipantId(1)));
        assert_eq!(ids(&pool), vec![3, 4]);

        assert!(pool.remove(ParticipantId(4)));
        assert_eq!(ids(&pool), vec![3]);

        assert!(pool.remove(ParticipantId(3)));
        assert!(pool.is_empty());
        assert_eq!(pool.iter().next(), None);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut pool = pool_of(&[5]);
        assert!(!pool.remove(ParticipantId(9)));
        assert!(pool.remove(ParticipantId(5)));
        assert!(!pool.remove(ParticipantId(5)));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_requeue_after_remove_goes_to_tail() {
        let mut pool = pool_of(&[1, 2, 3]);
        pool.remove(ParticipantId(1));
        pool.enqueue(ParticipantId(1)).unwrap();
        assert_eq!(ids(&pool), vec![2, 3, 1]);
        assert_eq!(pool.dequeue(), Ok(ParticipantId(2)));
    }

    #[test]
    fn test_enqueue_after_drain_relinks_head() {
        let mut pool = pool_of(&[1]);
        pool.dequeue().unwrap();
        pool.enqueue(ParticipantId(2)).unwrap();
        pool.enqueue(ParticipantId(3)).unwrap();
        assert_eq!(ids(&pool), vec![2, 3]);
        assert!(pool.contains(ParticipantId(3)));
    }
}
