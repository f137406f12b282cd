use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::listener::{bootstrap, Endpoint, ListenerConfig, NameGenerator, RandomSuffix};
use crate::traits::TransportConfig;

/// Connected `AF_UNIX`/`SOCK_SEQPACKET` socket.
///
/// Message boundaries are preserved: every send arrives as exactly one
/// receive, together with any descriptors attached to it.
#[derive(Debug)]
pub struct SeqPacketStream {
    fd: OwnedFd,
}

impl SeqPacketStream {
    /// Connect to a listening seqpacket socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = connect_at(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to seqpacket socket");
        Ok(stream)
    }

    /// Connected, unnamed pair of sockets.
    pub fn pair() -> Result<(Self, Self)> {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: `fds` is a valid two-element array for socketpair to fill.
        cvt(unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_SEQPACKET, 0, fds.as_mut_ptr()) })?;
        // SAFETY: socketpair succeeded, so both descriptors are open and ours.
        let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(a.as_fd())?;
        set_cloexec(b.as_fd())?;
        Ok((Self { fd: a }, Self { fd: b }))
    }

    /// Apply the timeouts from `config`.
    pub fn apply_config(&self, config: &TransportConfig) -> Result<()> {
        self.set_read_timeout(config.read_timeout)?;
        self.set_write_timeout(config.write_timeout)
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_timeout(libc::SO_RCVTIMEO, timeout)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_timeout(libc::SO_SNDTIMEO, timeout)
    }

    fn set_timeout(&self, option: libc::c_int, timeout: Option<Duration>) -> Result<()> {
        let tv = match timeout {
            Some(d) if d.is_zero() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot set a zero duration timeout",
                )
                .into());
            }
            Some(d) => {
                let mut tv = libc::timeval {
                    tv_sec: d.as_secs().try_into().unwrap_or(libc::time_t::MAX),
                    tv_usec: d.subsec_micros() as libc::suseconds_t,
                };
                if tv.tv_sec == 0 && tv.tv_usec == 0 {
                    tv.tv_usec = 1;
                }
                tv
            }
            None => libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        // SAFETY: `tv` is a valid timeval and the length matches its size.
        cvt(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                option,
                (&tv as *const libc::timeval).cast::<libc::c_void>(),
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and the descriptor is an open Unix socket owned by this stream.
        let rc = unsafe {
            libc::getsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl AsFd for SeqPacketStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for SeqPacketStream {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl From<SeqPacketStream> for OwnedFd {
    fn from(stream: SeqPacketStream) -> Self {
        stream.fd
    }
}

/// Listening seqpacket socket bound to a filesystem path.
///
/// The path is removed on drop, unless it has since been replaced by another
/// endpoint (checked by device and inode).
#[derive(Debug)]
pub struct SeqPacketListener {
    fd: OwnedFd,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl SeqPacketListener {
    /// Name reported in diagnostics.
    pub const TRANSPORT_NAME: &'static str = "unix-seqpacket";

    /// Listen at `path` with the default bootstrap settings.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::listen(path, &ListenerConfig::default())
    }

    /// Listen at `path`, taking the name over from a stale or live instance
    /// when `config.overwrite` is set.
    pub fn listen(path: impl AsRef<Path>, config: &ListenerConfig) -> Result<Self> {
        Self::listen_with(path, config, &mut RandomSuffix::default())
    }

    /// Like [`SeqPacketListener::listen`] with an explicit temporary-name
    /// generator.
    pub fn listen_with<G: NameGenerator>(
        path: impl AsRef<Path>,
        config: &ListenerConfig,
        names: &mut G,
    ) -> Result<Self> {
        let path = path.as_ref();
        check_path_len(path)?;
        refuse_non_socket(path)?;

        let listener: Self = bootstrap(path, config, names)?;
        info!(path = ?listener.path, "listening on seqpacket socket");
        Ok(listener)
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SeqPacketStream> {
        // SAFETY: null address pointers are permitted when the peer address is unused.
        let fd = cvt_retry(|| unsafe {
            libc::accept(self.fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut())
        })
        .map_err(TransportError::Accept)?;
        // SAFETY: accept returned a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        set_cloexec(fd.as_fd()).map_err(TransportError::Accept)?;
        debug!("accepted connection");
        Ok(SeqPacketStream { fd })
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Endpoint for SeqPacketListener {
    fn bind_endpoint(path: &Path, config: &ListenerConfig) -> io::Result<Self> {
        let (addr, len) = socket_addr(path)?;
        let fd = new_socket()?;
        // SAFETY: `addr` is an initialised sockaddr_un and `len` covers the used part.
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        })?;
        let metadata = std::fs::symlink_metadata(path)?;
        let listener = Self {
            fd,
            path: path.to_path_buf(),
            created_inode: (metadata.dev(), metadata.ino()),
        };

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(config.socket_mode))?;
        // SAFETY: the descriptor is a bound socket owned by `listener`.
        cvt(unsafe { libc::listen(listener.fd.as_raw_fd(), libc::SOMAXCONN) })?;
        Ok(listener)
    }

    fn relocate(&mut self, path: PathBuf) {
        self.path = path;
    }
}

impl AsFd for SeqPacketListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for SeqPacketListener {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

/// Longest usable socket path on this platform, excluding the terminator.
pub fn max_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_path.len() - 1
}

pub(crate) fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    let max = max_path_len();
    if len > max {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max,
        });
    }
    Ok(())
}

/// Bootstrap may rename over a socket but never over any other file.
fn refuse_non_socket(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.file_type().is_socket() => Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            ),
        }),
        _ => Ok(()),
    }
}

fn connect_at(path: &Path) -> io::Result<SeqPacketStream> {
    let (addr, len) = socket_addr(path)?;
    let fd = new_socket()?;
    // SAFETY: `addr` is an initialised sockaddr_un and `len` covers the used part.
    cvt(unsafe {
        libc::connect(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            len,
        )
    })?;
    Ok(SeqPacketStream { fd })
}

fn socket_addr(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let bytes = path.as_os_str().as_bytes();
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path too long",
        ));
    }
    if bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path contains a nul byte",
        ));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    let len = mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}

fn new_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the result is checked before use.
    let fd = cvt(unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET, 0) })?;
    // SAFETY: socket succeeded, so `fd` is open and ours.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    set_cloexec(fd.as_fd())?;
    Ok(fd)
}

pub(crate) fn set_cloexec(fd: BorrowedFd<'_>) -> io::Result<()> {
    // SAFETY: `fd` is a valid open descriptor for the duration of the call.
    cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
    Ok(())
}

pub(crate) fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn cvt_retry<F: FnMut() -> libc::c_int>(mut f: F) -> io::Result<libc::c_int> {
    loop {
        match cvt(f()) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
