//! Common test utilities and helpers
//!
//! Shared payloads and thread helpers for the integration tests.

use fanout::pubsub::api::{PipelineResult, Subscriber, Worker};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: u32,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub order: u32,
    pub total: u32,
}

/// Collects everything it is handed
#[derive(Debug)]
pub struct Collector<T> {
    pub items: Vec<T>,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Send + 'static> Worker for Collector<T> {}

pub fn spawn<W: Worker>(subscriber: Subscriber<W>) -> mpsc::Receiver<PipelineResult<W>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(subscriber.run());
    });
    receiver
}
