//! Per-origin FIFO task queue.
//!
//! `push_front` is reserved for redirect retries, which must be served
//! ahead of anything submitted after them; `push_back` is for freshly
//! submitted requests.

use crate::origin::Origin;
use dashmap::DashMap;
use std::collections::VecDeque;

pub struct OriginQueue<T> {
    queues: DashMap<Origin, VecDeque<T>>,
}

impl<T> Default for OriginQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OriginQueue<T> {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Enqueue at the tail: a freshly submitted request.
    pub fn push_back(&self, origin: Origin, task: T) {
        self.queues.entry(origin).or_default().push_back(task);
    }

    /// Re-queue at the head: a redirect retry, which must be served ahead
    /// of anything submitted after it.
    pub fn push_front(&self, origin: Origin, task: T) {
        self.queues.entry(origin).or_default().push_front(task);
    }

    /// Remove and return the task at `origin`'s head, if any. Drops the
    /// origin's entry entirely once its queue empties.
    pub fn pop_front(&self, origin: &Origin) -> Option<T> {
        let mut bucket = self.queues.get_mut(origin)?;
        let task = bucket.pop_front();
        if bucket.is_empty() {
            drop(bucket);
            self.queues.remove(origin);
        }
        task
    }

    pub fn len(&self, origin: &Origin) -> usize {
        self.queues.get(origin).map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, origin: &Origin) -> bool {
        self.len(origin) == 0
    }
}
