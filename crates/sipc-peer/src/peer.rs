use sipc_codec::{parse_message, Entry, EntryType, MessageBuilder, Value};
use sipc_transport::{BorrowedHandle, HandleTransport, OwnedHandle, TransportConfig};
use tracing::debug;

use crate::error::{PeerError, Result};

/// Default receive buffer: the largest message a peer accepts.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Peer behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub recv_buffer_size: usize,
    pub transport: TransportConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            transport: TransportConfig::default(),
        }
    }
}

/// One received message.
#[derive(Debug)]
pub struct Inbound {
    pub entries: Vec<Entry>,
    /// Handles delivered with the message, in the sender's order.
    pub handles: Vec<OwnedHandle>,
}

impl Inbound {
    /// The first entry of the message, if any.
    pub fn first(&self) -> Option<&Entry> {
        self.entries.first()
    }

    /// True if any entry is an error reply.
    pub fn is_error(&self) -> bool {
        self.entries.iter().any(|e| e.kind == EntryType::Error)
    }
}

/// A connected peer exchanging whole messages of entries plus handles.
pub struct Peer<T> {
    id: String,
    transport: T,
    buf: Vec<u8>,
}

impl<T: HandleTransport> Peer<T> {
    pub fn new(id: impl Into<String>, transport: T, config: &PeerConfig) -> Self {
        Self {
            id: id.into(),
            transport,
            buf: vec![0; config.recv_buffer_size],
        }
    }

    /// Identifier of the remote side: `peer-N` when accepted, the endpoint
    /// name when dialed.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send `entries` as one message together with `handles`.
    ///
    /// At least one entry is required: an empty message is indistinguishable
    /// from a closed connection on the receiving side.
    pub fn send(&mut self, entries: &[Entry], handles: &[BorrowedHandle<'_>]) -> Result<()> {
        if entries.is_empty() {
            return Err(PeerError::EmptyMessage);
        }
        let mut builder = MessageBuilder::new();
        for entry in entries {
            if !builder.push(entry) {
                return Err(PeerError::UnexpectedHandleEntry);
            }
        }
        self.transport.send(builder.as_bytes(), handles)?;
        debug!(peer = %self.id, entries = entries.len(), handles = handles.len(), "sent");
        Ok(())
    }

    pub fn send_request(&mut self, values: &[Value], handles: &[BorrowedHandle<'_>]) -> Result<()> {
        self.send_values(EntryType::Request, values, handles)
    }

    pub fn send_success(&mut self, values: &[Value]) -> Result<()> {
        self.send_values(EntryType::Success, values, &[])
    }

    pub fn send_error(&mut self, values: &[Value]) -> Result<()> {
        self.send_values(EntryType::Error, values, &[])
    }

    fn send_values(
        &mut self,
        kind: EntryType,
        values: &[Value],
        handles: &[BorrowedHandle<'_>],
    ) -> Result<()> {
        self.send(&[Entry::new(kind, values.to_vec())], handles)
    }

    /// Receive and parse one message.
    pub fn recv(&mut self) -> Result<Inbound> {
        let (n, handles) = self.transport.receive(&mut self.buf)?;
        if n == 0 && handles.is_empty() {
            return Err(PeerError::Disconnected(self.id.clone()));
        }
        let entries = parse_message(&self.buf[..n])?;
        if entries.iter().any(|e| e.kind == EntryType::HandleCarrier) {
            return Err(PeerError::UnexpectedHandleEntry);
        }
        debug!(peer = %self.id, entries = entries.len(), handles = handles.len(), "received");
        Ok(Inbound { entries, handles })
    }

    /// Send a request and wait for the next message.
    pub fn call(&mut self, values: &[Value], handles: &[BorrowedHandle<'_>]) -> Result<Inbound> {
        self.send_request(values, handles)?;
        self.recv()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T> std::fmt::Debug for Peer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("recv_buffer_size", &self.buf.len())
            .finish()
    }
}
