//! Peer RPC subsystem.
//!
//! # Data Flow
//! ```text
//! RaConfig.va_service / RaConfig.amqp
//!     → peers.rs TransportSelection (endpoint descriptor present → Modern)
//!     → endpoint.rs (Modern) or broker.rs (Legacy) → Arc<dyn RpcChannel>
//!     → PeerClient (typed capability calls)
//!     → RA core sees only ValidationAuthority / CertificateAuthority / StorageAuthority
//! ```
//!
//! # Design Decisions
//! - Transport is chosen once at construction; callers never see it
//! - Certification and Storage always use the legacy broker
//! - Every construction failure is fatal and names the peer

pub mod broker;
pub mod channel;
pub mod endpoint;
pub mod peers;

pub use channel::{RemoteError, RpcChannel, RpcError, Transport};
pub use peers::{
    CertificateAuthority, Peer, PeerClient, PeerClients, PeerSetupError, StorageAuthority,
    TransportSelection, ValidationAuthority,
};
