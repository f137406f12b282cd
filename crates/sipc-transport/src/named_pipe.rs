//! Message-mode named pipes and cross-process handle duplication (Windows).

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsHandle, AsRawHandle, FromRawHandle, OwnedHandle};
use std::ptr;

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    DuplicateHandle, DUPLICATE_CLOSE_SOURCE, DUPLICATE_SAME_ACCESS, ERROR_PIPE_CONNECTED, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::PIPE_ACCESS_DUPLEX;
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, GetNamedPipeClientProcessId, GetNamedPipeServerProcessId,
    SetNamedPipeHandleState, PIPE_READMODE_MESSAGE, PIPE_REJECT_REMOTE_CLIENTS,
    PIPE_TYPE_MESSAGE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcess, PROCESS_DUP_HANDLE};

use crate::error::{Result, TransportError};
use crate::handle::BorrowedHandle;
use crate::inband::HandleDuplicator;

const PIPE_BUFFER_SIZE: u32 = 4096;

/// Full pipe path for an endpoint name.
pub fn pipe_path(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

/// Server side of a named pipe. Every accept creates a fresh instance.
#[derive(Debug)]
pub struct NamedPipeListener {
    path: String,
    wide_path: Vec<u16>,
}

impl NamedPipeListener {
    /// Name reported in diagnostics.
    pub const TRANSPORT_NAME: &'static str = "windows-named-pipe";

    pub fn bind(name: &str) -> Result<Self> {
        let path = pipe_path(name);
        info!(%path, "listening on named pipe");
        Ok(Self {
            wide_path: wide(&path),
            path,
        })
    }

    /// Wait for one client (blocking).
    pub fn accept(&self) -> Result<NamedPipe> {
        // SAFETY: `wide_path` is nul-terminated and outlives the call.
        let raw = unsafe {
            CreateNamedPipeW(
                self.wide_path.as_ptr(),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
                PIPE_UNLIMITED_INSTANCES,
                PIPE_BUFFER_SIZE,
                PIPE_BUFFER_SIZE,
                0,
                ptr::null(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(TransportError::Accept(io::Error::last_os_error()));
        }
        // SAFETY: CreateNamedPipeW returned a fresh handle that nothing else owns.
        let pipe = unsafe { OwnedHandle::from_raw_handle(raw as _) };

        // SAFETY: `pipe` is a valid pipe handle; no overlapped structure is used.
        if unsafe { ConnectNamedPipe(raw_of(&pipe), ptr::null_mut()) } == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
                return Err(TransportError::Accept(err));
            }
        }

        let mut pid = 0u32;
        // SAFETY: `pid` is a valid out pointer.
        if unsafe { GetNamedPipeClientProcessId(raw_of(&pipe), &mut pid) } == 0 {
            return Err(TransportError::Accept(io::Error::last_os_error()));
        }
        debug!(path = %self.path, pid, "accepted named pipe client");
        Ok(NamedPipe {
            file: File::from(pipe),
            remote_pid: pid,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Connected message-mode pipe plus the process id at the other end.
#[derive(Debug)]
pub struct NamedPipe {
    file: File,
    remote_pid: u32,
}

impl NamedPipe {
    /// Open a client connection to the pipe for `name`.
    pub fn connect(name: &str) -> Result<Self> {
        let path = pipe_path(name);
        let connect_err = |e: io::Error| TransportError::Connect {
            path: path.clone().into(),
            source: e,
        };
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(connect_err)?;

        let mode = PIPE_READMODE_MESSAGE;
        // SAFETY: `mode` is a valid pointer; the other parameters are optional.
        if unsafe {
            SetNamedPipeHandleState(raw_of(&file), &mode, ptr::null(), ptr::null())
        } == 0
        {
            return Err(connect_err(io::Error::last_os_error()));
        }

        let mut pid = 0u32;
        // SAFETY: `pid` is a valid out pointer.
        if unsafe { GetNamedPipeServerProcessId(raw_of(&file), &mut pid) } == 0 {
            return Err(connect_err(io::Error::last_os_error()));
        }
        debug!(%path, pid, "connected to named pipe");
        Ok(Self {
            file,
            remote_pid: pid,
        })
    }

    /// Process id of the peer, used as the duplication target.
    pub fn remote_pid(&self) -> u32 {
        self.remote_pid
    }
}

impl Read for NamedPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for NamedPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Duplicates handles into one target process with `DuplicateHandle`.
#[derive(Debug)]
pub struct ProcessDuplicator {
    target: OwnedHandle,
}

impl ProcessDuplicator {
    /// Open `pid` with `PROCESS_DUP_HANDLE` access.
    pub fn open(pid: u32) -> io::Result<Self> {
        // SAFETY: plain OpenProcess call; the result is checked before use.
        let raw = unsafe { OpenProcess(PROCESS_DUP_HANDLE, 0, pid) };
        if raw.is_null() {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: OpenProcess returned a fresh handle that nothing else owns.
        let target = unsafe { OwnedHandle::from_raw_handle(raw as _) };
        Ok(Self { target })
    }
}

impl HandleDuplicator for ProcessDuplicator {
    fn duplicate(&mut self, handle: BorrowedHandle<'_>) -> io::Result<u64> {
        let mut remote: HANDLE = ptr::null_mut();
        // SAFETY: all handles are valid for the call and `remote` is a valid out pointer.
        let ok = unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                raw_of(&handle),
                raw_of(&self.target),
                &mut remote,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(remote as usize as u64)
    }

    fn release(&mut self, remote: u64) -> io::Result<()> {
        // SAFETY: closing a handle in the target process; no local handle is produced.
        let ok = unsafe {
            DuplicateHandle(
                raw_of(&self.target),
                remote as usize as HANDLE,
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                0,
                DUPLICATE_CLOSE_SOURCE,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn raw_of<T: AsHandle>(source: &T) -> HANDLE {
    source.as_handle().as_raw_handle() as HANDLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_names_live_in_pipe_namespace() {
        assert_eq!(pipe_path("sipc-demo"), r"\\.\pipe\sipc-demo");
    }

    #[test]
    fn accept_reports_client_pid() {
        let name = format!("sipc-test-{}", std::process::id());
        let listener = NamedPipeListener::bind(&name).unwrap();
        let client_name = name.clone();
        let client = std::thread::spawn(move || {
            // The server instance may not exist yet; retry briefly.
            for _ in 0..50 {
                if let Ok(mut pipe) = NamedPipe::connect(&client_name) {
                    pipe.write_all(b"S\n").unwrap();
                    return pipe.remote_pid();
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            panic!("could not connect");
        });

        let mut server = listener.accept().unwrap();
        assert_eq!(server.remote_pid(), std::process::id());
        let mut buf = [0u8; 8];
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"S\n");
        assert_eq!(client.join().unwrap(), std::process::id());
    }
}
