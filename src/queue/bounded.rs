//! BoundedQueue implementation
//!
//! A FIFO guarded by a single mutex with two condition variables:
//! - `data_ready` wakes poppers when an item arrives or the queue is
//!   interrupted/aborted
//! - `space_ready` wakes pushers blocked on a full governed queue

use crate::core::sync::recover_poison;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

struct QueueState<T> {
    items: VecDeque<T>,
    /// Maximum depth before pushes block; 0 means unbounded
    governor: usize,
    interrupted: bool,
    aborted: bool,
    /// High-water mark of `items.len()`
    maximum_size: usize,
}

impl<T> QueueState<T> {
    fn is_full(&self) -> bool {
        self.governor > 0 && self.items.len() >= self.governor
    }
}

/// Thread-safe FIFO with optional capacity governor
///
/// Designed for one producer and one consumer per instance. Several
/// producers may push concurrently; their items are ordered by lock
/// acquisition only.
///
/// # Example
///
/// ```rust
/// use fanout::queue::BoundedQueue;
///
/// let queue = BoundedQueue::with_governor(2);
/// assert!(queue.push("a"));
/// assert!(queue.push("b"));
/// assert_eq!(queue.pop(), Some("a"));
///
/// queue.abort();
/// assert!(!queue.push("c"));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    data_ready: Condvar,
    space_ready: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::with_governor(0)
    }

    /// Create a queue that blocks pushers once `governor` items are queued
    pub fn with_governor(governor: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                governor,
                interrupted: false,
                aborted: false,
                maximum_size: 0,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        recover_poison(self.state.lock())
    }

    /// Append an item, blocking while the queue is governed and full
    ///
    /// Returns `false` and drops the item if the queue is (or becomes)
    /// aborted.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        while !state.aborted && state.is_full() {
            state = recover_poison(self.space_ready.wait(state));
        }
        if state.aborted {
            return false;
        }

        state.items.push_back(item);
        state.maximum_size = state.maximum_size.max(state.items.len());
        drop(state);

        self.data_ready.notify_one();
        true
    }

    /// Remove the oldest item, blocking while the queue is empty
    ///
    /// Returns `None` when woken by an interrupt or abort with nothing left
    /// to deliver. An interrupted queue still hands out remaining items.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        while state.items.is_empty() && !state.interrupted && !state.aborted {
            state = recover_poison(self.data_ready.wait(state));
        }
        self.take_front(state)
    }

    /// Remove the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        let state = self.lock();
        self.take_front(state)
    }

    fn take_front(&self, mut state: MutexGuard<'_, QueueState<T>>) -> Option<T> {
        if state.aborted {
            return None;
        }
        let item = state.items.pop_front()?;
        drop(state);

        self.space_ready.notify_one();
        Some(item)
    }

    /// Set or clear the interrupt flag
    ///
    /// Setting it wakes every blocked popper without discarding data; it is
    /// the "no more producers, drain what is left" signal.
    pub fn set_interrupt(&self, interrupted: bool) {
        self.lock().interrupted = interrupted;
        if interrupted {
            self.data_ready.notify_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// Permanently disable the queue
    ///
    /// Discards queued items, wakes every waiter, and turns all later push
    /// and pop calls into immediate failures.
    pub fn abort(&self) {
        let discarded = {
            let mut state = self.lock();
            state.aborted = true;
            std::mem::take(&mut state.items)
        };
        self.data_ready.notify_all();
        self.space_ready.notify_all();
        // Items are dropped outside the lock
        drop(discarded);
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Current capacity bound, 0 when unbounded
    pub fn governor(&self) -> usize {
        self.lock().governor
    }

    /// Change the capacity bound; blocked pushers re-check immediately
    pub fn set_governor(&self, governor: usize) {
        self.lock().governor = governor;
        self.space_ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Largest number of items ever held at once
    pub fn maximum_size(&self) -> usize {
        self.lock().maximum_size
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("governor", &state.governor)
            .field("interrupted", &state.interrupted)
            .field("aborted", &state.aborted)
            .field("maximum_size", &state.maximum_size)
            .finish()
    }
}
