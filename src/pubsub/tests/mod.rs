//! Test modules for the publish/subscribe system
//!
//! Tests are organised by functional area; shared payload types and
//! workers live in `fixtures`.

mod delivery;
mod fixtures;
