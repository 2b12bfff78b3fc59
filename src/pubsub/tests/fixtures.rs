//! Payload types and workers shared by the pubsub tests

use crate::pubsub::api::{BoxError, PipelineResult, Subscriber, TypeRelations, Worker};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for waiting on a worker thread
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alpha(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beta(pub u32);

/// Unrelated to the other payloads unless a conversion is declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gamma(pub u32);

impl From<Alpha> for Gamma {
    fn from(alpha: Alpha) -> Self {
        Gamma(alpha.0 * 10)
    }
}

pub trait Shape: Send + Sync {
    fn area(&self) -> u32;
}

pub struct Square(pub u32);

impl Shape for Square {
    fn area(&self) -> u32 {
        self.0 * self.0
    }
}

pub struct Rectangle(pub u32, pub u32);

impl Shape for Rectangle {
    fn area(&self) -> u32 {
        self.0 * self.1
    }
}

pub fn shape_relations() -> TypeRelations {
    TypeRelations::new()
        .derives::<Square, dyn Shape>(|square| square)
        .derives::<Rectangle, dyn Shape>(|rectangle| rectangle)
}

/// Worker that records what it saw, in order
#[derive(Debug, Default)]
pub struct Journal {
    pub entries: Vec<String>,
}

impl Worker for Journal {}

/// Shared event log for workers whose state is lost on failure
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn recorded(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

/// Worker whose hooks record themselves and can be told to fail
#[derive(Debug, Default)]
pub struct Instrumented {
    pub events: Events,
    pub refuse_initialize: bool,
    pub fail_before_end_publication: bool,
    pub fail_before_end_thread: bool,
}

impl Instrumented {
    pub fn new(events: &Events) -> Self {
        Self {
            events: Arc::clone(events),
            ..Default::default()
        }
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl Worker for Instrumented {
    fn initialize(&mut self) -> bool {
        self.record("initialize");
        !self.refuse_initialize
    }

    fn before_end_publication(&mut self) -> Result<(), BoxError> {
        self.record("before_end_publication");
        if self.fail_before_end_publication {
            return Err("flush refused".into());
        }
        Ok(())
    }

    fn after_end_publication(&mut self) -> Result<(), BoxError> {
        self.record("after_end_publication");
        Ok(())
    }

    fn before_end_thread(&mut self) -> Result<(), BoxError> {
        self.record("before_end_thread");
        if self.fail_before_end_thread {
            return Err("thread cleanup refused".into());
        }
        Ok(())
    }
}

/// Run a subscriber on its own thread
///
/// The result arrives on the returned channel; a panicking worker drops the
/// sender, which shows up as a disconnected channel.
pub fn spawn<W: Worker>(subscriber: Subscriber<W>) -> mpsc::Receiver<PipelineResult<W>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(subscriber.run());
    });
    receiver
}

/// Poll `condition` until it holds, failing the test after [`JOIN_TIMEOUT`]
pub fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + JOIN_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
