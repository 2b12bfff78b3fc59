//! Pipeline integration test modules

pub mod chains;
pub mod demo;
pub mod wiring;
