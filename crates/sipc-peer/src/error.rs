/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sipc_transport::TransportError),

    /// The received message was not valid wire format.
    #[error("codec error: {0}")]
    Codec(#[from] sipc_codec::CodecError),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A message must carry at least one entry.
    #[error("message has no entries")]
    EmptyMessage,

    /// A transport-reserved handle entry reached the application layer.
    #[error("handle entry in application message")]
    UnexpectedHandleEntry,
}

pub type Result<T> = std::result::Result<T, PeerError>;
