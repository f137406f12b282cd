use std::time::Duration;

use crate::error::Result;
use crate::handle::{BorrowedHandle, OwnedHandle};

/// Default cap on handles per message.
pub const DEFAULT_MAX_HANDLES: usize = 16;

/// Send and receive one message together with a set of OS handles.
///
/// Each call moves exactly one message. A send either delivers the whole
/// message and every handle or fails; partial transfer is never success.
/// Implementations are not safe for concurrent sends or concurrent receives
/// on the same connection; callers serialize access per direction.
pub trait HandleTransport {
    /// Send `message` with `handles`. The handles stay owned by the caller.
    fn send(&mut self, message: &[u8], handles: &[BorrowedHandle<'_>]) -> Result<()>;

    /// Receive one message into `buf`, returning its length and any handles
    /// that arrived with it, in the order the sender listed them.
    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedHandle>)>;
}

impl<T: HandleTransport + ?Sized> HandleTransport for &mut T {
    fn send(&mut self, message: &[u8], handles: &[BorrowedHandle<'_>]) -> Result<()> {
        (**self).send(message, handles)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedHandle>)> {
        (**self).receive(buf)
    }
}

impl<T: HandleTransport + ?Sized> HandleTransport for Box<T> {
    fn send(&mut self, message: &[u8], handles: &[BorrowedHandle<'_>]) -> Result<()> {
        (**self).send(message, handles)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedHandle>)> {
        (**self).receive(buf)
    }
}

/// Per-connection transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Most handles accepted in a single send or receive.
    pub max_handles: usize,
    /// Read timeout passed to the socket. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Write timeout passed to the socket. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_limits_handles() {
        let config = TransportConfig::default();
        assert_eq!(config.max_handles, 16);
        assert!(config.read_timeout.is_none());
        assert!(config.write_timeout.is_none());
    }
}
