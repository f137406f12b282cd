//! Simple IPC: canonical hex messages with OS handle passing.
//!
//! # Crate Structure
//!
//! - [`codec`]: the wire format (values, entries, canonical encoder, parser)
//! - [`transport`]: message transports that carry file descriptors or
//!   Windows handles next to each message
//! - [`peer`]: request/response sessions (behind `peer` feature)

/// Re-export codec types.
pub mod codec {
    pub use sipc_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use sipc_transport::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use sipc_peer::*;
}
