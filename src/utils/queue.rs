//! # Blocking Hand-off Queue
//!
//! A generic, blocking, multi-producer/multi-consumer FIFO used to move
//! packets between the network I/O runtime and the consumer (game-loop)
//! thread.
//!
//! Insertion order is preserved per producer; no ordering is guaranteed across
//! producers. `wake()` is a shutdown latch: it unblocks every waiter without
//! producing an item and disables blocking from then on, so consumer threads
//! can exit cleanly.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Unbounded MPMC FIFO with blocking pop and a shutdown latch.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    woken: bool,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                woken: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item at the tail.
    pub fn push_back(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_back(item);
        self.available.notify_one();
    }

    /// Insert an item at the head, ahead of everything already queued. Used
    /// for control packets that must outrank buffered data.
    pub fn push_front(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_front(item);
        self.available.notify_one();
    }

    /// Remove and return the head item, blocking while the queue is empty.
    ///
    /// Returns `None` only after [`BlockingQueue::wake`] has been called and
    /// the queue is drained.
    pub fn pop_front(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.woken {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`BlockingQueue::pop_front`] but gives up after `timeout`.
    pub fn pop_front_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.woken {
                return None;
            }
            if self.available.wait_for(&mut inner, timeout).timed_out() {
                return inner.items.pop_front();
            }
        }
    }

    /// Remove and return the head item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Discard all queued items.
    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    /// Unblock every waiter without producing an item and disable blocking
    /// permanently. Queued items remain poppable; once drained, pops return
    /// `None` immediately.
    pub fn wake(&self) {
        let mut inner = self.inner.lock();
        inner.woken = true;
        self.available.notify_all();
    }
}
