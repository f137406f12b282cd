use std::path::PathBuf;

/// Errors that can occur in descriptor-passing transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The underlying write transferred fewer bytes than requested.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The kernel dropped part of the received control data.
    #[error("control message truncated; received handles were closed")]
    ControlTruncated,

    /// The received message did not fit in the caller's buffer.
    #[error("message truncated to buffer capacity of {capacity} bytes")]
    MessageTruncated { capacity: usize },

    /// More handles than the configured limit.
    #[error("{count} handles exceeds limit of {max}")]
    TooManyHandles { count: usize, max: usize },

    /// Duplicating a handle into the remote process failed.
    #[error("handle duplication failed: {0}")]
    Duplicate(std::io::Error),

    /// A handle-carrier entry did not hold a usable identifier.
    #[error("invalid handle entry: {0}")]
    InvalidHandleEntry(String),

    /// Listener bootstrap exhausted its rename retries.
    #[error("endpoint {path} still in use after {attempts} attempts")]
    EndpointConflict { path: PathBuf, attempts: u32 },

    /// Handle-carrier entries could not be parsed.
    #[error("codec error: {0}")]
    Codec(#[from] sipc_codec::CodecError),
}

pub type Result<T> = std::result::Result<T, TransportError>;
