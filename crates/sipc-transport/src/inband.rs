//! Handle passing for pipes with no native descriptor channel.
//!
//! Each outgoing handle is duplicated straight into the receiving process;
//! the duplicate's identifier travels as a `W` entry ahead of the message:
//!
//! ```text
//! W 1a4
//! W 1b0
//! R 4:open
//! ```
//!
//! The receiver strips the leading `W` entries, adopts the identifiers, and
//! sees only the application bytes.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use sipc_codec::{append_entry_end, append_entry_start, append_uint, EntryType, Parser};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::handle::{adopt_raw, BorrowedHandle, OwnedHandle};
use crate::traits::{HandleTransport, TransportConfig, DEFAULT_MAX_HANDLES};

/// Installs handles in the remote process.
pub trait HandleDuplicator {
    /// Duplicate `handle` into the remote process and return the identifier
    /// it has there.
    fn duplicate(&mut self, handle: BorrowedHandle<'_>) -> io::Result<u64>;

    /// Close a remote duplicate that will never be delivered.
    fn release(&mut self, remote: u64) -> io::Result<()>;
}

/// [`HandleTransport`] over a message-mode pipe plus a [`HandleDuplicator`].
///
/// Received identifiers are adopted as owned handles, so the peer is trusted
/// to send only identifiers it duplicated into this process.
#[derive(Debug)]
pub struct InBandTransport<P, D> {
    pipe: P,
    duplicator: D,
    max_handles: usize,
}

impl<P: Read + Write, D: HandleDuplicator> InBandTransport<P, D> {
    pub fn new(pipe: P, duplicator: D) -> Self {
        Self {
            pipe,
            duplicator,
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }

    pub fn with_config(pipe: P, duplicator: D, config: &TransportConfig) -> Self {
        Self {
            pipe,
            duplicator,
            max_handles: config.max_handles,
        }
    }

    pub fn get_ref(&self) -> &P {
        &self.pipe
    }

    pub fn duplicator(&self) -> &D {
        &self.duplicator
    }

    pub fn into_parts(self) -> (P, D) {
        (self.pipe, self.duplicator)
    }

    /// Best-effort close of duplicates that never reached the peer.
    fn release_all(&mut self, remote: &[u64]) {
        for &id in remote {
            if let Err(e) = self.duplicator.release(id) {
                warn!(handle = id, error = %e, "failed to release orphaned duplicate");
            }
        }
        if !remote.is_empty() {
            debug!(count = remote.len(), "released orphaned duplicates");
        }
    }

    fn write_message(&mut self, out: &[u8]) -> Result<()> {
        let written = self.pipe.write(out)?;
        if written < out.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: out.len(),
            });
        }
        Ok(())
    }
}

impl<P: Read + Write, D: HandleDuplicator> HandleTransport for InBandTransport<P, D> {
    fn send(&mut self, message: &[u8], handles: &[BorrowedHandle<'_>]) -> Result<()> {
        if handles.len() > self.max_handles {
            return Err(TransportError::TooManyHandles {
                count: handles.len(),
                max: self.max_handles,
            });
        }
        if handles.is_empty() {
            return self.write_message(message);
        }

        let mut remote = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.duplicator.duplicate(*handle) {
                Ok(id) => remote.push(id),
                Err(e) => {
                    self.release_all(&remote);
                    return Err(TransportError::Duplicate(e));
                }
            }
        }

        let mut out = BytesMut::with_capacity(message.len() + 8 * remote.len());
        for id in &remote {
            append_entry_start(&mut out, EntryType::HandleCarrier);
            append_uint(&mut out, *id);
            append_entry_end(&mut out);
        }
        out.extend_from_slice(message);

        if let Err(e) = self.write_message(&out) {
            self.release_all(&remote);
            return Err(e);
        }
        debug!(bytes = message.len(), handles = remote.len(), "sent message");
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedHandle>)> {
        let n = self.pipe.read(buf)?;
        let scan = scan_handle_entries(&buf[..n]);

        // Every identifier is adopted before any check so that an error path
        // closes the duplicates by dropping them.
        let mut failure = scan.failure;
        let mut handles = Vec::with_capacity(scan.ids.len());
        for raw in scan.ids {
            // SAFETY: the peer duplicated `raw` into this process for us alone.
            match unsafe { adopt_raw(raw) } {
                Some(handle) => handles.push(handle),
                None => {
                    failure.get_or_insert_with(|| {
                        TransportError::InvalidHandleEntry(format!("handle id {raw} out of range"))
                    });
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if handles.len() > self.max_handles {
            return Err(TransportError::TooManyHandles {
                count: handles.len(),
                max: self.max_handles,
            });
        }

        let consumed = scan.consumed;
        buf.copy_within(consumed..n, 0);
        debug!(bytes = n - consumed, handles = handles.len(), "received message");
        Ok((n - consumed, handles))
    }
}

/// The leading `W` entries of a received message.
struct HandleScan {
    ids: Vec<u64>,
    /// Bytes spanned by the entries.
    consumed: usize,
    /// First bad entry. Scanning goes on past it so that later identifiers
    /// are still collected and closed.
    failure: Option<TransportError>,
}

fn scan_handle_entries(message: &[u8]) -> HandleScan {
    let mut parser = Parser::new(message);
    let mut ids = Vec::new();
    let mut failure = None;

    while let Ok(Some(EntryType::HandleCarrier)) = parser.next_entry_type() {
        let values = match parser.parse_entry() {
            Ok(values) => values,
            Err(e) => {
                failure.get_or_insert(TransportError::from(e));
                break;
            }
        };
        let Some(first) = values.first() else {
            continue;
        };
        match first.as_u64() {
            Some(raw) => ids.push(raw),
            None => {
                failure.get_or_insert_with(|| {
                    TransportError::InvalidHandleEntry(format!("expected handle id, got {first}"))
                });
            }
        }
    }

    HandleScan {
        ids,
        consumed: message.len() - parser.remaining(),
        failure,
    }
}
