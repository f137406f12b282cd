//! Request/response peer sessions over the sipc transport.
//!
//! A [`Peer`] sends whole messages of entries with handles attached and
//! receives them parsed. Handle-carrier entries never reach this layer.

pub mod error;
pub mod listener;
pub mod peer;

pub use error::{PeerError, Result};
pub use listener::{connect, connect_with_config, PeerListener};
pub use peer::{Inbound, Peer, PeerConfig, DEFAULT_RECV_BUFFER_SIZE};
