use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sipc_codec::{Entry, EntryType};
use sipc_peer::{Inbound, PeerError, PeerListener};
use sipc_transport::OwnedHandle;
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_entries, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        PeerListener::bind(&args.endpoint).map_err(|err| peer_error("bind failed", err))?;
    info!(endpoint = %args.endpoint, "serving");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut answered = 0usize;

    while running.load(Ordering::SeqCst) {
        let mut peer = listener
            .accept()
            .map_err(|err| peer_error("accept failed", err))?;

        #[cfg(unix)]
        if let Some((uid, gid, pid)) = peer.transport().get_ref().peer_credentials() {
            debug!(peer = peer.id(), uid, gid, pid, "peer credentials");
        }

        while running.load(Ordering::SeqCst) {
            let inbound = match peer.recv() {
                Ok(inbound) => inbound,
                Err(PeerError::Disconnected(_)) => break,
                Err(err) => return Err(peer_error("receive failed", err)),
            };

            print_entries(&inbound.entries, inbound.handles.len(), peer.id(), format)?;

            let Inbound { entries, handles } = inbound;
            if let Some(greeting) = &args.greeting {
                write_greeting(handles, greeting);
            }

            let replies = replies_for(entries);
            if replies.is_empty() {
                continue;
            }
            peer.send(&replies, &[])
                .map_err(|err| peer_error("reply failed", err))?;

            answered = answered.saturating_add(1);
            if let Some(count) = args.count {
                if answered >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

/// One success entry per request, echoing its values.
fn replies_for(entries: Vec<Entry>) -> Vec<Entry> {
    entries
        .into_iter()
        .filter(|entry| entry.kind == EntryType::Request)
        .map(|entry| Entry::success(entry.values))
        .collect()
}

fn write_greeting(handles: Vec<OwnedHandle>, greeting: &str) {
    for (index, handle) in handles.into_iter().enumerate() {
        let mut file = File::from(handle);
        match file.write_all(greeting.as_bytes()) {
            Ok(()) => debug!(index, "greeting written"),
            Err(err) => warn!(index, error = %err, "failed to write greeting"),
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipc_codec::Value;

    #[test]
    fn only_requests_are_answered() {
        let entries = vec![
            Entry::request(vec![Value::from("open"), Value::from(1u64)]),
            Entry::success(vec![Value::from("ignored")]),
            Entry::request(vec![]),
        ];
        let replies = replies_for(entries);
        assert_eq!(
            replies,
            vec![
                Entry::success(vec![Value::from("open"), Value::from(1u64)]),
                Entry::success(vec![]),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn greeting_lands_in_every_handle() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [dir.path().join("a.txt"), dir.path().join("b.txt")];
        let handles = paths
            .iter()
            .map(|p| {
                std::os::fd::OwnedFd::from(
                    std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(p)
                        .unwrap(),
                )
            })
            .collect();

        write_greeting(handles, "hello\n");

        for path in &paths {
            assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
        }
    }
}
