//! Staged, resumable teardown
//!
//! A worker thread releases its resources in a fixed sequence of stages.
//! Every stage runs exactly once: the tracker records a stage as reached
//! *before* running it, so a stage that fails (or panics) is never retried
//! and the sequence resumes at the following stage. Once the terminal
//! stage has run, the first failure is handed back to the caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use strum_macros::{Display, EnumIter};

/// Teardown stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CleanupStage {
    /// Nothing has run yet
    #[default]
    Initial,
    BeforeEndPublication,
    EndPublication,
    AfterEndPublication,
    Disconnect,
    AbortQueue,
    /// Terminal stage
    BeforeEndThread,
}

impl CleanupStage {
    /// The stage that follows this one, `None` for the terminal stage
    pub fn next(self) -> Option<Self> {
        use CleanupStage::*;
        match self {
            Initial => Some(BeforeEndPublication),
            BeforeEndPublication => Some(EndPublication),
            EndPublication => Some(AfterEndPublication),
            AfterEndPublication => Some(Disconnect),
            Disconnect => Some(AbortQueue),
            AbortQueue => Some(BeforeEndThread),
            BeforeEndThread => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

/// Something that knows how to perform each teardown stage
pub trait Cleanup {
    type Error: std::fmt::Display;

    /// Perform the action of a single stage. Never called for `Initial`.
    fn run_stage(&mut self, stage: CleanupStage) -> Result<(), Self::Error>;
}

/// Records how far teardown has progressed
#[derive(Debug, Default)]
pub struct CleanupTracker {
    stage: CleanupStage,
}

impl CleanupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Run every stage that has not been started yet
    ///
    /// Failures and panics of individual stages do not stop the sequence.
    /// After the terminal stage, a captured panic is resumed; otherwise the
    /// first error is returned. Calling this on a completed tracker is a
    /// no-op returning `Ok(())`.
    pub fn resume<C: Cleanup>(&mut self, target: &mut C) -> Result<(), C::Error> {
        let mut first_error: Option<C::Error> = None;
        let mut first_panic: Option<Box<dyn Any + Send>> = None;

        while let Some(stage) = self.stage.next() {
            self.stage = stage;
            log::trace!("cleanup stage {} starting", stage);

            match panic::catch_unwind(AssertUnwindSafe(|| target.run_stage(stage))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("cleanup stage {} failed: {}", stage, e);
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    log::warn!("cleanup stage {} panicked", stage);
                    first_panic.get_or_insert(payload);
                }
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        first_error.map_or(Ok(()), Err)
    }
}
