use std::fmt;
use std::io;

use sipc_codec::CodecError;
use sipc_peer::PeerError;
use sipc_transport::TransportError;

// Exit code constants follow sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Codec(err) => codec_error(context, err),
        TransportError::TooManyHandles { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Codec(err) => codec_error(context, err),
        PeerError::UnexpectedHandleEntry => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        PeerError::EmptyMessage => CliError::new(USAGE, format!("{context}: {err}")),
        PeerError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_exit_codes() {
        let timeout = io_error("recv", io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(timeout.code, TIMEOUT);
        let missing = io_error("connect", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(missing.code, TRANSPORT_ERROR);
        assert!(missing.message.starts_with("connect: "));
    }

    #[test]
    fn codec_failures_are_invalid_data() {
        let err = peer_error(
            "receive failed",
            PeerError::Codec(CodecError::InvalidEncoding { offset: 2 }),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn empty_message_is_usage_error() {
        let err = peer_error("send failed", PeerError::EmptyMessage);
        assert_eq!(err.code, USAGE);
        assert_eq!(err.message, "send failed: message has no entries");
    }

    #[test]
    fn handle_limit_is_usage_error() {
        let err = transport_error(
            "send failed",
            TransportError::TooManyHandles { count: 20, max: 16 },
        );
        assert_eq!(err.code, USAGE);
    }
}
