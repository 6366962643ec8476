//! FIFO of requests waiting for a concurrency slot.

use std::collections::{HashMap, VecDeque};

use thumbnail_cache::RequestKey;

/// Insertion-ordered map of key -> waiters.
///
/// A key keeps the position of its first enqueue; later requests for the same
/// key join its waiter list instead of queueing again.
pub(crate) struct PendingQueue<R> {
    order: VecDeque<RequestKey>,
    waiters: HashMap<RequestKey, Vec<R>>,
}

impl<R> PendingQueue<R> {
    pub(crate) fn new() -> Self {
        Self {
            order: VecDeque::new(),
            waiters: HashMap::new(),
        }
    }

    pub(crate) fn push(&mut self, key: RequestKey, request: R) {
        match self.waiters.get_mut(&key) {
            Some(waiters) => waiters.push(request),
            None => {
                self.order.push_back(key.clone());
                self.waiters.insert(key, vec![request]);
            }
        }
    }

    /// Oldest key still waiting.
    pub(crate) fn front_key(&self) -> Option<&RequestKey> {
        self.order.front()
    }

    /// Remove a key and return all of its waiters.
    pub(crate) fn take(&mut self, key: &RequestKey) -> Option<Vec<R>> {
        let waiters = self.waiters.remove(key)?;
        self.order.retain(|k| k != key);
        Some(waiters)
    }

    pub(crate) fn contains(&self, key: &RequestKey) -> bool {
        self.waiters.contains_key(key)
    }

    pub(crate) fn any_waiter<F>(&self, key: &RequestKey, predicate: F) -> bool
    where
        F: Fn(&R) -> bool,
    {
        self.waiters
            .get(key)
            .is_some_and(|waiters| waiters.iter().any(predicate))
    }

    /// Remove the first waiter under `key` matching `predicate`, dropping the
    /// key once it has no waiters left. Returns whether one was removed.
    pub(crate) fn remove_waiter<F>(&mut self, key: &RequestKey, predicate: F) -> bool
    where
        F: Fn(&R) -> bool,
    {
        let Some(waiters) = self.waiters.get_mut(key) else {
            return false;
        };
        let Some(index) = waiters.iter().position(predicate) else {
            return false;
        };

        waiters.remove(index);
        if waiters.is_empty() {
            self.take(key);
        }
        true
    }

    /// Number of distinct keys waiting.
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> RequestKey {
        RequestKey::new(id, 64)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingQueue::new();
        queue.push(key("a"), 1);
        queue.push(key("b"), 2);
        queue.push(key("c"), 3);

        assert_eq!(queue.front_key(), Some(&key("a")));
        assert_eq!(queue.take(&key("a")), Some(vec![1]));
        assert_eq!(queue.front_key(), Some(&key("b")));
    }

    #[test]
    fn test_duplicate_key_joins_existing_entry() {
        let mut queue = PendingQueue::new();
        queue.push(key("a"), 1);
        queue.push(key("b"), 2);
        queue.push(key("a"), 3);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.waiter_count(), 3);
        assert_eq!(queue.front_key(), Some(&key("a")));
        assert_eq!(queue.take(&key("a")), Some(vec![1, 3]));
    }

    #[test]
    fn test_same_id_different_size_is_separate() {
        let mut queue = PendingQueue::new();
        queue.push(RequestKey::new("a", 50), 1);
        queue.push(RequestKey::new("a", 70), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove_waiter() {
        let mut queue = PendingQueue::new();
        queue.push(key("a"), 1);
        queue.push(key("a"), 2);

        assert!(queue.remove_waiter(&key("a"), |r| *r == 1));
        assert!(!queue.remove_waiter(&key("a"), |r| *r == 1));
        assert_eq!(queue.len(), 1);

        assert!(queue.remove_waiter(&key("a"), |r| *r == 2));
        assert!(queue.is_empty());
        assert!(queue.front_key().is_none());
    }

    #[test]
    fn test_any_waiter() {
        let mut queue = PendingQueue::new();
        queue.push(key("a"), 7);
        assert!(queue.contains(&key("a")));
        assert!(!queue.contains(&key("b")));
        assert!(queue.any_waiter(&key("a"), |r| *r == 7));
        assert!(!queue.any_waiter(&key("a"), |r| *r == 8));
        assert!(!queue.any_waiter(&key("b"), |_| true));
    }

    #[test]
    fn test_clear() {
        let mut queue = PendingQueue::new();
        queue.push(key("a"), 1);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.waiter_count(), 0);
    }
}
