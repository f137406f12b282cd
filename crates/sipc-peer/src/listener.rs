use std::sync::atomic::{AtomicU64, Ordering};

use sipc_transport::{Connection, Listener, ListenerConfig};
use tracing::info;

use crate::error::Result;
use crate::peer::{Peer, PeerConfig};

/// Listens for and accepts peer connections.
#[derive(Debug)]
pub struct PeerListener {
    listener: Listener,
    peer_config: PeerConfig,
    next_peer_id: AtomicU64,
}

impl PeerListener {
    /// Listen on `name`, taking it over if a stale instance holds it.
    pub fn bind(name: &str) -> Result<Self> {
        Self::bind_with(name, &ListenerConfig::default())
    }

    /// Listen with explicit bootstrap settings.
    pub fn bind_with(name: &str, config: &ListenerConfig) -> Result<Self> {
        let listener = sipc_transport::listen_with(name, config)?;
        Ok(Self {
            listener,
            peer_config: PeerConfig::default(),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Override peer behavior config.
    pub fn with_peer_config(mut self, config: PeerConfig) -> Self {
        self.peer_config = config;
        self
    }

    /// Accept next connection and assign an auto-generated peer id.
    pub fn accept(&self) -> Result<Peer<Connection>> {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("peer-{id}"))
    }

    /// Accept next connection and use explicit peer id.
    pub fn accept_with_id(&self, peer_id: &str) -> Result<Peer<Connection>> {
        let connection = sipc_transport::accept(&self.listener, &self.peer_config.transport)?;
        info!(peer = peer_id, "peer connected");
        Ok(Peer::new(peer_id, connection, &self.peer_config))
    }

    /// The underlying platform listener.
    pub fn listener(&self) -> &Listener {
        &self.listener
    }
}

/// Connect to a listening peer.
pub fn connect(name: &str) -> Result<Peer<Connection>> {
    connect_with_config(name, &PeerConfig::default())
}

/// Connect with explicit configuration. The peer id is the endpoint name.
pub fn connect_with_config(name: &str, config: &PeerConfig) -> Result<Peer<Connection>> {
    let connection = sipc_transport::dial_with(name, &config.transport)?;
    Ok(Peer::new(name, connection, config))
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;

    use sipc_codec::{EntryType, Value};

    use super::*;
    use crate::error::PeerError;

    fn make_sock_path(dir: &tempfile::TempDir) -> String {
        dir.path()
            .join("listener.sock")
            .to_str()
            .expect("temp path should be utf-8")
            .to_string()
    }

    #[test]
    fn accept_returns_peer() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let name = make_sock_path(&dir);
        let listener = PeerListener::bind(&name).expect("listener should bind");

        let server = thread::spawn(move || {
            let peer = listener.accept().expect("listener should accept");
            assert_eq!(peer.id(), "peer-1");
        });

        let client = connect(&name).expect("client should connect");
        assert_eq!(client.id(), name);
        server.join().expect("server thread should finish");
    }

    #[test]
    fn accepts_multiple_sequential_connections() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let name = make_sock_path(&dir);
        let listener = PeerListener::bind(&name).expect("listener should bind");

        let server = thread::spawn(move || {
            let first = listener.accept().expect("first accept should succeed");
            let second = listener.accept().expect("second accept should succeed");
            assert_eq!(first.id(), "peer-1");
            assert_eq!(second.id(), "peer-2");
        });

        let _c1 = connect(&name).expect("first client should connect");
        let _c2 = connect(&name).expect("second client should connect");
        server.join().expect("server thread should finish");
    }

    #[test]
    fn echo_call_until_disconnect() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let name = make_sock_path(&dir);
        let listener = PeerListener::bind(&name).expect("listener should bind");

        let server = thread::spawn(move || {
            let mut peer = listener.accept().expect("listener should accept");
            let mut served = 0;
            loop {
                match peer.recv() {
                    Ok(inbound) => {
                        let request = &inbound.entries[0];
                        assert_eq!(request.kind, EntryType::Request);
                        peer.send_success(&request.values).expect("reply should send");
                        served += 1;
                    }
                    Err(PeerError::Disconnected(_)) => return served,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        });

        let mut client = connect(&name).expect("client should connect");
        for i in 0..3u64 {
            let reply = client
                .call(&[Value::from("echo"), Value::from(i)], &[])
                .expect("call should succeed");
            assert_eq!(reply.entries[0].kind, EntryType::Success);
            assert_eq!(reply.entries[0].values[1], Value::from(i));
        }
        drop(client);
        assert_eq!(server.join().expect("server thread should finish"), 3);
    }
}
