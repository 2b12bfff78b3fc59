//! Bounded Queue Component
//!
//! A blocking FIFO used as the transport underneath every publish/subscribe
//! connection. Each subscription owns one queue for its items, and each
//! subscriber owns a governed "master" queue that records the order in
//! which its subscriptions received work.
//!
//! # Overview
//!
//! - **Blocking pop**: consumers sleep while the queue is empty
//! - **Governor**: an optional, runtime-adjustable capacity; producers
//!   block while the queue is full (backpressure)
//! - **Interrupt**: wakes consumers without discarding data, used to
//!   signal "no more producers, drain what is left"
//! - **Abort**: the forced half of shutdown; discards everything and makes
//!   the queue permanently inert
//!
//! ```text
//!  producer ──push──▶ ┌───┬───┬───┬───┐ ──pop──▶ consumer
//!  (blocks when full) │ 1 │ 2 │ 3 │...│ (blocks when empty)
//!                     └───┴───┴───┴───┘
//!                       ▲ governor = max depth (0 = unbounded)
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use fanout::queue::BoundedQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(BoundedQueue::with_governor(4));
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..10 {
//!             queue.push(i);
//!         }
//!         queue.set_interrupt(true);
//!     })
//! };
//!
//! let mut received = Vec::new();
//! while let Some(item) = queue.pop() {
//!     received.push(item);
//! }
//! producer.join().unwrap();
//! assert_eq!(received, (0..10).collect::<Vec<_>>());
//! ```

mod bounded;

pub mod api;

pub use bounded::BoundedQueue;

#[cfg(test)]
mod tests;
