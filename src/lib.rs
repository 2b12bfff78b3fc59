pub mod app;
pub mod core;
pub mod pubsub;
pub mod queue;
