//! DNS resolution subsystem.
//!
//! # Data Flow
//! ```text
//! RA core lookup_host(name)
//!     → resolver.rs (retry budget, per-try timeout, address policy)
//!     → exchange.rs (one attempt against upstream servers)
//!     → address.rs (restricted range check, production variant only)
//! ```
//!
//! # Design Decisions
//! - Retry budget is clamped to at least one try
//! - Only transient failures are retried
//! - The loopback variant exists for test environments and is logged loudly

pub mod address;
pub mod exchange;
pub mod resolver;

pub use exchange::{DnsExchange, ExchangeError, HickoryExchange};
pub use resolver::{
    build_resolver, effective_tries, DnsError, DnsResolver, Resolver, ResolverVariant,
};
