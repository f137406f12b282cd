//! Platform handle types.
//!
//! On Unix a handle is a file descriptor; on Windows it is a kernel `HANDLE`.
//! Both convert into [`std::fs::File`] with `File::from`.

#[cfg(unix)]
pub type OwnedHandle = std::os::fd::OwnedFd;
#[cfg(unix)]
pub type BorrowedHandle<'a> = std::os::fd::BorrowedFd<'a>;

#[cfg(windows)]
pub use std::os::windows::io::{BorrowedHandle, OwnedHandle};

/// Borrow the handle behind any handle-owning value.
#[cfg(unix)]
pub fn borrow_handle<T: std::os::fd::AsFd>(source: &T) -> BorrowedHandle<'_> {
    source.as_fd()
}

/// Borrow the handle behind any handle-owning value.
#[cfg(windows)]
pub fn borrow_handle<T: std::os::windows::io::AsHandle>(source: &T) -> BorrowedHandle<'_> {
    source.as_handle()
}

/// Numeric identifier of a borrowed handle, as carried in handle entries.
#[cfg(unix)]
pub fn raw_id(handle: BorrowedHandle<'_>) -> u64 {
    use std::os::fd::AsRawFd;
    handle.as_raw_fd() as u64
}

#[cfg(windows)]
pub fn raw_id(handle: BorrowedHandle<'_>) -> u64 {
    use std::os::windows::io::AsRawHandle;
    handle.as_raw_handle() as usize as u64
}

/// Take ownership of a handle identifier received from a peer.
///
/// # Safety
///
/// `raw` must name an open handle in this process that nothing else owns.
#[cfg(unix)]
pub(crate) unsafe fn adopt_raw(raw: u64) -> Option<OwnedHandle> {
    use std::os::fd::FromRawFd;
    let fd = std::os::fd::RawFd::try_from(raw).ok()?;
    // SAFETY: forwarded from the caller's contract.
    Some(unsafe { OwnedHandle::from_raw_fd(fd) })
}

/// Take ownership of a handle identifier received from a peer.
///
/// # Safety
///
/// `raw` must name an open handle in this process that nothing else owns.
#[cfg(windows)]
pub(crate) unsafe fn adopt_raw(raw: u64) -> Option<OwnedHandle> {
    use std::os::windows::io::{FromRawHandle, RawHandle};
    if raw == 0 {
        return None;
    }
    let handle = usize::try_from(raw).ok()? as RawHandle;
    // SAFETY: forwarded from the caller's contract.
    Some(unsafe { OwnedHandle::from_raw_handle(handle) })
}
