//! Local IPC transports that carry OS handles alongside each message.
//!
//! Two strategies implement [`HandleTransport`]:
//! - [`AncillaryTransport`]: descriptors ride in `SCM_RIGHTS` control
//!   messages over `SOCK_SEQPACKET` Unix sockets.
//! - [`InBandTransport`]: handles are duplicated into the peer process and
//!   their identifiers prepended to the message as `W` entries (Windows
//!   named pipes).
//!
//! The platform's strategy is chosen at build time and exposed as
//! [`Connection`] and [`Listener`], with [`listen`], [`accept`] and [`dial`]
//! as entry points.

pub mod error;
pub mod handle;
pub mod inband;
pub mod listener;
pub mod traits;

#[cfg(unix)]
pub mod ancillary;
#[cfg(unix)]
pub mod seqpacket;

#[cfg(windows)]
pub mod named_pipe;

pub use error::{Result, TransportError};
pub use handle::{borrow_handle, raw_id, BorrowedHandle, OwnedHandle};
pub use inband::{HandleDuplicator, InBandTransport};
pub use listener::{
    bootstrap, Endpoint, ListenerConfig, NameGenerator, RandomSuffix, SequenceNames,
};
pub use traits::{HandleTransport, TransportConfig, DEFAULT_MAX_HANDLES};

#[cfg(unix)]
pub use ancillary::{AncillarySocket, AncillaryTransport, ReceivedMessage};
#[cfg(unix)]
pub use seqpacket::{SeqPacketListener, SeqPacketStream};

#[cfg(windows)]
pub use named_pipe::{NamedPipe, NamedPipeListener, ProcessDuplicator};

/// The platform's connected transport.
#[cfg(unix)]
pub type Connection = AncillaryTransport<SeqPacketStream>;
/// The platform's connected transport.
#[cfg(windows)]
pub type Connection = InBandTransport<NamedPipe, ProcessDuplicator>;

/// The platform's listening endpoint.
#[cfg(unix)]
pub type Listener = SeqPacketListener;
/// The platform's listening endpoint.
#[cfg(windows)]
pub type Listener = NamedPipeListener;

/// Listen on `name` (a socket path on Unix, a pipe name on Windows).
pub fn listen(name: &str) -> Result<Listener> {
    listen_with(name, &ListenerConfig::default())
}

#[cfg(unix)]
pub fn listen_with(name: &str, config: &ListenerConfig) -> Result<Listener> {
    SeqPacketListener::listen(name, config)
}

/// Pipe instances are unlimited, so there is no name to take over.
#[cfg(windows)]
pub fn listen_with(name: &str, _config: &ListenerConfig) -> Result<Listener> {
    NamedPipeListener::bind(name)
}

/// Accept one connection and wrap it in the platform transport.
#[cfg(unix)]
pub fn accept(listener: &Listener, config: &TransportConfig) -> Result<Connection> {
    let stream = listener.accept()?;
    stream.apply_config(config)?;
    Ok(AncillaryTransport::with_config(stream, config))
}

/// Accept one connection and wrap it in the platform transport.
///
/// Named pipes have no socket timeouts; `config` only sets the handle limit.
#[cfg(windows)]
pub fn accept(listener: &Listener, config: &TransportConfig) -> Result<Connection> {
    let pipe = listener.accept()?;
    let duplicator = ProcessDuplicator::open(pipe.remote_pid()).map_err(TransportError::Duplicate)?;
    Ok(InBandTransport::with_config(pipe, duplicator, config))
}

/// Connect to `name` with the default transport settings.
pub fn dial(name: &str) -> Result<Connection> {
    dial_with(name, &TransportConfig::default())
}

#[cfg(unix)]
pub fn dial_with(name: &str, config: &TransportConfig) -> Result<Connection> {
    let stream = SeqPacketStream::connect(name)?;
    stream.apply_config(config)?;
    Ok(AncillaryTransport::with_config(stream, config))
}

#[cfg(windows)]
pub fn dial_with(name: &str, config: &TransportConfig) -> Result<Connection> {
    let pipe = NamedPipe::connect(name)?;
    let duplicator = ProcessDuplicator::open(pipe.remote_pid()).map_err(TransportError::Duplicate)?;
    Ok(InBandTransport::with_config(pipe, duplicator, config))
}
