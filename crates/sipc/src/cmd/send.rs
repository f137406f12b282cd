use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use sipc_peer::{connect_with_config, PeerConfig};
use sipc_transport::{borrow_handle, BorrowedHandle, TransportConfig};

use crate::cmd::SendArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_entries, OutputFormat};
use crate::tokenize::parse_line;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let values = parse_line(&args.line)?;
    let files = args
        .attach
        .iter()
        .map(|path| open_attachment(path))
        .collect::<CliResult<Vec<File>>>()?;

    let wait_timeout = parse_duration(&args.timeout)?;
    let peer_config = PeerConfig {
        transport: TransportConfig {
            read_timeout: args.wait.then_some(wait_timeout),
            ..TransportConfig::default()
        },
        ..PeerConfig::default()
    };
    let mut peer = connect_with_config(&args.endpoint, &peer_config)
        .map_err(|err| peer_error("connect failed", err))?;

    let handles: Vec<BorrowedHandle<'_>> = files.iter().map(borrow_handle).collect();
    peer.send_request(&values, &handles)
        .map_err(|err| peer_error("send failed", err))?;

    if !args.wait {
        return Ok(SUCCESS);
    }

    let reply = peer
        .recv()
        .map_err(|err| peer_error("receive failed", err))?;
    print_entries(&reply.entries, reply.handles.len(), peer.id(), format)?;

    Ok(if reply.is_error() { FAILURE } else { SUCCESS })
}

/// Attachments are opened for appending so the receiver can write to them.
fn open_attachment(path: &Path) -> CliResult<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
