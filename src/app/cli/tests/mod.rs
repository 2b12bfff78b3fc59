//! Tests for the CLI module
//!
//! Argument parsing and configuration loading are tested separately.
