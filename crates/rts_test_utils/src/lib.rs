//! # RTS Test Utilities
//!
//! Shared testing utilities for the production crates:
//! - Determinism test harness
//! - Fixture sessions, catalogs and upgrade books
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
