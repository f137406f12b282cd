//! Descriptor passing over a socket's control-message channel (`SCM_RIGHTS`).

use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::seqpacket::SeqPacketStream;
use crate::traits::{HandleTransport, TransportConfig, DEFAULT_MAX_HANDLES};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Result of one `recvmsg`.
#[derive(Debug)]
pub struct ReceivedMessage {
    pub len: usize,
    pub handles: Vec<OwnedFd>,
    /// `MSG_CTRUNC`: some descriptors did not fit the control buffer.
    pub control_truncated: bool,
    /// `MSG_TRUNC`: the payload did not fit the data buffer.
    pub data_truncated: bool,
}

/// A packet socket that can carry descriptors next to its payload.
pub trait AncillarySocket {
    /// One `sendmsg`. Returns the number of payload bytes written.
    fn send_with_handles(&mut self, data: &[u8], handles: &[BorrowedFd<'_>]) -> io::Result<usize>;

    /// One `recvmsg` with room for `max_handles` descriptors.
    fn recv_with_handles(&mut self, buf: &mut [u8], max_handles: usize)
        -> io::Result<ReceivedMessage>;
}

impl AncillarySocket for SeqPacketStream {
    fn send_with_handles(&mut self, data: &[u8], handles: &[BorrowedFd<'_>]) -> io::Result<usize> {
        send_rights(self.as_fd(), data, handles)
    }

    fn recv_with_handles(
        &mut self,
        buf: &mut [u8],
        max_handles: usize,
    ) -> io::Result<ReceivedMessage> {
        recv_rights(self.as_fd(), buf, max_handles)
    }
}

/// [`HandleTransport`] that packs handles into control messages.
#[derive(Debug)]
pub struct AncillaryTransport<S = SeqPacketStream> {
    socket: S,
    max_handles: usize,
}

impl<S: AncillarySocket> AncillaryTransport<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }

    /// Apply `config`'s handle limit. Timeouts belong to the socket itself.
    pub fn with_config(socket: S, config: &TransportConfig) -> Self {
        Self {
            socket,
            max_handles: config.max_handles,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.socket
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn into_inner(self) -> S {
        self.socket
    }
}

impl<S: AncillarySocket> HandleTransport for AncillaryTransport<S> {
    fn send(&mut self, message: &[u8], handles: &[BorrowedFd<'_>]) -> Result<()> {
        if handles.len() > self.max_handles {
            return Err(TransportError::TooManyHandles {
                count: handles.len(),
                max: self.max_handles,
            });
        }
        let written = self.socket.send_with_handles(message, handles)?;
        if written < message.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: message.len(),
            });
        }
        debug!(bytes = written, handles = handles.len(), "sent message");
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Vec<OwnedFd>)> {
        let received = self.socket.recv_with_handles(buf, self.max_handles)?;
        if received.control_truncated {
            warn!(
                received = received.handles.len(),
                "control message truncated; closing received handles"
            );
            return Err(TransportError::ControlTruncated);
        }
        if received.data_truncated {
            return Err(TransportError::MessageTruncated {
                capacity: buf.len(),
            });
        }
        if received.handles.len() > self.max_handles {
            return Err(TransportError::TooManyHandles {
                count: received.handles.len(),
                max: self.max_handles,
            });
        }
        debug!(
            bytes = received.len,
            handles = received.handles.len(),
            "received message"
        );
        Ok((received.len, received.handles))
    }
}

/// 8-byte aligned storage for control messages.
struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    fn for_handles(count: usize) -> Self {
        let payload = (count * mem::size_of::<RawFd>()) as libc::c_uint;
        // SAFETY: CMSG_SPACE only computes a size.
        let len = unsafe { libc::CMSG_SPACE(payload) } as usize;
        Self {
            words: vec![0u64; len.div_ceil(mem::size_of::<u64>())],
            len,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.words.as_mut_ptr().cast()
    }
}

fn send_rights(fd: BorrowedFd<'_>, data: &[u8], handles: &[BorrowedFd<'_>]) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: data.as_ptr() as *mut libc::c_void,
        iov_len: data.len(),
    };
    // SAFETY: msghdr is plain old data; all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    let mut control = ControlBuffer::for_handles(handles.len());
    if !handles.is_empty() {
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len as _;
        let payload = (handles.len() * mem::size_of::<RawFd>()) as libc::c_uint;
        // SAFETY: the control buffer holds CMSG_SPACE(payload) aligned bytes, so the
        // first header and its data region are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(payload) as _;
            let slots = libc::CMSG_DATA(cmsg).cast::<RawFd>();
            for (i, handle) in handles.iter().enumerate() {
                slots.add(i).write_unaligned(handle.as_raw_fd());
            }
        }
    }

    loop {
        // SAFETY: `msg` points at live iovec and control buffers for the call.
        let rc = unsafe { libc::sendmsg(fd.as_raw_fd(), &msg, SEND_FLAGS) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn recv_rights(fd: BorrowedFd<'_>, buf: &mut [u8], max_handles: usize) -> io::Result<ReceivedMessage> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let mut control = ControlBuffer::for_handles(max_handles.max(1));
    // SAFETY: msghdr is plain old data; all-zero is a valid empty header.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.len as _;

    let len = loop {
        // SAFETY: `msg` points at live iovec and control buffers for the call.
        let rc = unsafe { libc::recvmsg(fd.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if rc >= 0 {
            break rc as usize;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    };

    let mut handles = Vec::new();
    // SAFETY: the kernel filled `msg_controllen` bytes of well-formed control
    // messages; each SCM_RIGHTS descriptor is newly installed and owned by us.
    unsafe {
        let header = libc::CMSG_LEN(0) as usize;
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let count = ((*cmsg).cmsg_len as usize - header) / mem::size_of::<RawFd>();
                let slots = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                for i in 0..count {
                    handles.push(OwnedFd::from_raw_fd(slots.add(i).read_unaligned()));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    if RECV_FLAGS == 0 {
        for handle in &handles {
            crate::seqpacket::set_cloexec(handle.as_fd())?;
        }
    }

    Ok(ReceivedMessage {
        len,
        handles,
        control_truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
        data_truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Seek, Write};

    fn file_with(text: &str) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.rewind().unwrap();
        file
    }

    fn read_all(handle: OwnedFd) -> String {
        let mut file = File::from(handle);
        file.rewind().unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    fn pair() -> (AncillaryTransport, AncillaryTransport) {
        let (a, b) = SeqPacketStream::pair().unwrap();
        (AncillaryTransport::new(a), AncillaryTransport::new(b))
    }

    #[test]
    fn handles_arrive_in_order_with_message() {
        let (mut tx, mut rx) = pair();
        let first = file_with("first");
        let second = file_with("second");

        tx.send(b"R 4:open\n", &[first.as_fd(), second.as_fd()])
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, handles) = rx.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"R 4:open\n");
        assert_eq!(handles.len(), 2);
        let mut handles = handles.into_iter();
        assert_eq!(read_all(handles.next().unwrap()), "first");
        assert_eq!(read_all(handles.next().unwrap()), "second");
    }

    #[test]
    fn message_without_handles() {
        let (mut tx, mut rx) = pair();
        tx.send(b"S\n", &[]).unwrap();
        let mut buf = [0u8; 8];
        let (n, handles) = rx.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"S\n");
        assert!(handles.is_empty());
    }

    #[test]
    fn too_many_handles_rejected_before_io() {
        let (a, b) = SeqPacketStream::pair().unwrap();
        let config = TransportConfig {
            max_handles: 1,
            ..TransportConfig::default()
        };
        let mut tx = AncillaryTransport::with_config(a, &config);
        let f1 = file_with("a");
        let f2 = file_with("b");
        let err = tx.send(b"R\n", &[f1.as_fd(), f2.as_fd()]).unwrap_err();
        assert!(matches!(err, TransportError::TooManyHandles { count: 2, max: 1 }));

        b.set_read_timeout(Some(std::time::Duration::from_millis(20)))
            .unwrap();
        let mut rx = AncillaryTransport::new(b);
        let mut buf = [0u8; 8];
        assert!(matches!(rx.receive(&mut buf), Err(TransportError::Io(_))));
    }

    #[test]
    fn excess_handles_truncate_control_and_are_closed() {
        let (a, b) = SeqPacketStream::pair().unwrap();
        let mut tx = AncillaryTransport::new(a);
        let config = TransportConfig {
            max_handles: 1,
            ..TransportConfig::default()
        };
        let mut rx = AncillaryTransport::with_config(b, &config);

        let files: Vec<File> = (0..6).map(|i| file_with(&i.to_string())).collect();
        let fds: Vec<BorrowedFd<'_>> = files.iter().map(|f| f.as_fd()).collect();
        tx.send(b"R\n", &fds).unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            rx.receive(&mut buf),
            Err(TransportError::ControlTruncated)
        ));
    }

    #[test]
    fn oversized_payload_reports_truncation() {
        let (mut tx, mut rx) = pair();
        tx.send(&[b'x'; 32], &[]).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            rx.receive(&mut buf),
            Err(TransportError::MessageTruncated { capacity: 8 })
        ));
    }

    #[test]
    fn closed_peer_reads_as_empty_message() {
        let (a, b) = SeqPacketStream::pair().unwrap();
        drop(a);
        let mut rx = AncillaryTransport::new(b);
        let mut buf = [0u8; 8];
        let (n, handles) = rx.receive(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert!(handles.is_empty());
    }

    /// Accepts only part of each payload and records what it was given.
    #[derive(Default)]
    struct ShortSocket {
        attempted_handles: usize,
    }

    impl AncillarySocket for ShortSocket {
        fn send_with_handles(
            &mut self,
            data: &[u8],
            handles: &[BorrowedFd<'_>],
        ) -> io::Result<usize> {
            self.attempted_handles = handles.len();
            Ok(data.len() / 2)
        }

        fn recv_with_handles(
            &mut self,
            _buf: &mut [u8],
            _max_handles: usize,
        ) -> io::Result<ReceivedMessage> {
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        }
    }

    #[test]
    fn short_write_is_a_hard_failure() {
        let mut tx = AncillaryTransport::new(ShortSocket::default());
        let f1 = file_with("a");
        let f2 = file_with("b");
        let err = tx
            .send(b"R 5:hello\n", &[f1.as_fd(), f2.as_fd()])
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortWrite {
                written: 5,
                expected: 10
            }
        ));
        assert_eq!(tx.get_ref().attempted_handles, 2);
    }
}
