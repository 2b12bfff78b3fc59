//! Typed Publish/Subscribe Component
//!
//! Publishers own one [`Publication`](api::Publication) per payload type
//! they emit; subscribers own one [`Subscription`](api::Subscription) per
//! payload type they handle. Connecting a publisher to a subscriber pairs
//! the two sets by payload type, and every published item is then shared
//! (never copied) with each connected subscription.
//!
//! # Overview
//!
//! - **Publisher**: named, cloneable handle; publication ends explicitly or
//!   when the last clone goes away
//! - **Subscriber**: worker state plus typed handlers, driven by `run` on a
//!   dedicated thread
//! - **Resolver**: exact payload matches first, then declared upcasts, then
//!   declared conversions; each publication connects at most once
//! - **Teardown**: a staged cleanup that always completes, even when a
//!   handler or hook fails
//!
//! ```text
//!  Publisher ──┬── Publication<Reading> ──▶ Subscription<Reading> ──┐
//!              └── Publication<Alarm>   ──▶ Subscription<Alarm>   ──┤
//!                                                                  ▼
//!                                          master queue (slot tokens) ──▶ worker
//! ```
//!
//! Relations between payload types are declared, not inferred; see
//! [`TypeRelations`](api::TypeRelations).

pub(crate) mod error;
pub(crate) mod payload;
pub(crate) mod publication;
pub(crate) mod publisher;
pub(crate) mod resolver;
pub(crate) mod settings;
pub(crate) mod subscriber;
pub(crate) mod subscription;

pub mod api;

#[cfg(test)]
mod tests;
