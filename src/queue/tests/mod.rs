//! Test modules for the bounded queue
//!
//! Tests are organised by functional area.
