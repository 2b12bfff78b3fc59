//! Public API for the queue system
//!
//! External modules should import from here rather than directly from
//! internal modules.

pub use crate::queue::bounded::BoundedQueue;
