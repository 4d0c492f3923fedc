//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms through a StatsScope)
//!
//! Background, best-effort:
//!     → metrics.rs debug server (Prometheus scrape)
//!     → profiling.rs (runtime gauges)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing
//! - One stats scope per component, derived from a shared root
//! - Failures here never abort startup

pub mod logging;
pub mod metrics;
pub mod profiling;

pub use self::metrics::StatsScope;
