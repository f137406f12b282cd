//! Singleton endpoint bootstrap.
//!
//! Binding a name that is already taken (typically by a stale instance) is
//! retried by binding a randomized temporary name next to it and renaming
//! that onto the target. Concurrent launches race on bind and rename; the
//! attempt bound breaks the race without eliminating it.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// Default number of temporary names tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Listener bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Temporary names tried after the target is found in use.
    pub max_attempts: u32,
    /// Take the name over when it is in use. When false the first
    /// `AddrInUse` is returned as a bind error.
    pub overwrite: bool,
    /// Permission bits applied to a freshly bound socket path.
    pub socket_mode: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            overwrite: true,
            socket_mode: 0o600,
        }
    }
}

/// Source of temporary endpoint names.
pub trait NameGenerator {
    fn candidate(&mut self, target: &Path) -> PathBuf;
}

/// `<target>.tmp<random 64-bit hex>`.
#[derive(Debug, Default)]
pub struct RandomSuffix;

impl NameGenerator for RandomSuffix {
    fn candidate(&mut self, target: &Path) -> PathBuf {
        let mut name = OsString::from(target.as_os_str());
        name.push(format!(".tmp{:x}", rand::thread_rng().gen::<u64>()));
        PathBuf::from(name)
    }
}

/// Hands out a fixed list of names, then repeats the last one.
#[derive(Debug, Clone)]
pub struct SequenceNames {
    names: VecDeque<PathBuf>,
    last: Option<PathBuf>,
}

impl SequenceNames {
    pub fn new<I: IntoIterator<Item = PathBuf>>(names: I) -> Self {
        Self {
            names: names.into_iter().collect(),
            last: None,
        }
    }
}

impl NameGenerator for SequenceNames {
    fn candidate(&mut self, target: &Path) -> PathBuf {
        if let Some(next) = self.names.pop_front() {
            self.last = Some(next.clone());
            return next;
        }
        self.last
            .clone()
            .unwrap_or_else(|| target.with_extension("tmp"))
    }
}

/// Something that can be bound at a filesystem name.
pub trait Endpoint: Sized {
    /// Bind a fresh endpoint at `path`. A name already in use must surface
    /// as [`io::ErrorKind::AddrInUse`].
    fn bind_endpoint(path: &Path, config: &ListenerConfig) -> io::Result<Self>;

    /// Record that the endpoint now lives at `path`.
    fn relocate(&mut self, path: PathBuf);
}

/// Bind `path`, taking it over through a temporary name if it is in use.
pub fn bootstrap<E: Endpoint, G: NameGenerator + ?Sized>(
    path: &Path,
    config: &ListenerConfig,
    names: &mut G,
) -> Result<E> {
    match E::bind_endpoint(path, config) {
        Ok(endpoint) => return Ok(endpoint),
        Err(e) if config.overwrite && e.kind() == io::ErrorKind::AddrInUse => {
            debug!(?path, "endpoint in use; binding a temporary name");
        }
        Err(e) => {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }

    let mut attempts = 0;
    let (mut endpoint, temp) = loop {
        if attempts == config.max_attempts {
            warn!(?path, attempts, "endpoint bootstrap exhausted retries");
            return Err(TransportError::EndpointConflict {
                path: path.to_path_buf(),
                attempts,
            });
        }
        attempts += 1;
        let candidate = names.candidate(path);
        debug!(?candidate, attempt = attempts, "trying temporary endpoint");
        match E::bind_endpoint(&candidate, config) {
            Ok(endpoint) => break (endpoint, candidate),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
            Err(e) => {
                return Err(TransportError::Bind {
                    path: candidate,
                    source: e,
                })
            }
        }
    };

    // Dropping `endpoint` on failure releases the temporary name.
    std::fs::rename(&temp, path).map_err(|e| TransportError::Bind {
        path: path.to_path_buf(),
        source: e,
    })?;
    endpoint.relocate(path.to_path_buf());
    info!(?path, from = ?temp, "took over endpoint by rename");
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static BINDS: Cell<u32> = const { Cell::new(0) };
    }

    /// Plain file standing in for a socket; existing files are "in use".
    #[derive(Debug)]
    struct FileEndpoint {
        path: PathBuf,
    }

    impl Endpoint for FileEndpoint {
        fn bind_endpoint(path: &Path, _config: &ListenerConfig) -> io::Result<Self> {
            BINDS.with(|b| b.set(b.get() + 1));
            std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => io::Error::from(io::ErrorKind::AddrInUse),
                    _ => e,
                })?;
            Ok(Self {
                path: path.to_path_buf(),
            })
        }

        fn relocate(&mut self, path: PathBuf) {
            self.path = path;
        }
    }

    fn binds() -> u32 {
        BINDS.with(|b| b.replace(0))
    }

    #[test]
    fn free_name_binds_directly() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ep");
        binds();

        let mut names = SequenceNames::new(Vec::<PathBuf>::new());
        let ep: FileEndpoint = bootstrap(&target, &ListenerConfig::default(), &mut names).unwrap();
        assert_eq!(ep.path, target);
        assert_eq!(binds(), 1);
    }

    #[test]
    fn busy_name_is_replaced_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ep");
        std::fs::write(&target, b"stale").unwrap();
        let taken = dir.path().join("ep.tmpa");
        std::fs::write(&taken, b"").unwrap();
        binds();

        let mut names = SequenceNames::new([taken.clone(), dir.path().join("ep.tmpb")]);
        let ep: FileEndpoint = bootstrap(&target, &ListenerConfig::default(), &mut names).unwrap();
        assert_eq!(ep.path, target);
        assert_eq!(binds(), 3, "target, one conflicting temp, one free temp");
        assert!(std::fs::read(&target).unwrap().is_empty());
        assert!(!dir.path().join("ep.tmpb").exists());
    }

    #[test]
    fn exhaustion_reports_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ep");
        let taken = dir.path().join("ep.tmp0");
        std::fs::write(&target, b"").unwrap();
        std::fs::write(&taken, b"").unwrap();
        binds();

        let mut names = SequenceNames::new([taken]);
        let err = bootstrap::<FileEndpoint, _>(&target, &ListenerConfig::default(), &mut names)
            .unwrap_err();
        match err {
            TransportError::EndpointConflict { path, attempts } => {
                assert_eq!(path, target);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(binds(), 6);
    }

    #[test]
    fn overwrite_disabled_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ep");
        std::fs::write(&target, b"").unwrap();
        binds();

        let config = ListenerConfig {
            overwrite: false,
            ..ListenerConfig::default()
        };
        let err = bootstrap::<FileEndpoint, _>(&target, &config, &mut RandomSuffix).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert_eq!(binds(), 1);
    }

    #[test]
    fn random_suffix_extends_target_name() {
        let target = Path::new("/run/app.sock");
        let candidate = RandomSuffix.candidate(target);
        let name = candidate.to_str().unwrap();
        assert!(name.starts_with("/run/app.sock.tmp"));
        let suffix = &name["/run/app.sock.tmp".len()..];
        assert!(!suffix.is_empty() && suffix.len() <= 16);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
