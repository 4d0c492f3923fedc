//! Inbound RPC surface of the RA.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, trace, body limit, timeout)
//!     → admission.rs (concurrency ceiling, 503 above it)
//!     → handlers.rs (decode JSON, call RegistrationAuthority)
//!     → response.rs (RaError → status + error body)
//! ```

pub mod admission;
pub mod handlers;
pub mod response;
pub mod server;

pub use admission::Admission;
pub use server::{BoundServer, InboundServer, ServerError, MAX_BODY_BYTES};
