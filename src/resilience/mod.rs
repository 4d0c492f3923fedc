//! Resilience helpers.
//!
//! # Design Decisions
//! - Only connection establishment is retried with backoff; startup stages
//!   themselves are never retried
//! - Delays carry up to 10% jitter

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
