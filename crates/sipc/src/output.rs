use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use sipc_codec::{Entry, Value};

use crate::exit::{io_error, CliResult};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    kind: &'static str,
    tag: String,
    values: Vec<serde_json::Value>,
    handles: usize,
    peer_id: &'a str,
    timestamp: String,
}

/// Print one message. `handles` counts the handles that arrived with it and
/// is reported against every entry of the message.
pub fn print_entries(
    entries: &[Entry],
    handles: usize,
    peer_id: &str,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let timestamp = now_unix_seconds();
            for entry in entries {
                let out = EntryOutput {
                    kind: entry.kind.name(),
                    tag: char::from(entry.kind.tag()).to_string(),
                    values: entry.values.iter().map(Value::to_json).collect(),
                    handles,
                    peer_id,
                    timestamp: timestamp.clone(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENTRY", "VALUES", "HANDLES", "PEER"]);
            for entry in entries {
                table.add_row(vec![
                    entry.kind.name().to_string(),
                    render_values(&entry.values),
                    handles.to_string(),
                    peer_id.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in entries {
                println!(
                    "{} {} handles={} peer={}",
                    char::from(entry.kind.tag()),
                    render_values(&entry.values),
                    handles,
                    peer_id
                );
            }
        }
        OutputFormat::Raw => {
            let mut wire = BytesMut::new();
            for entry in entries {
                entry.encode(&mut wire);
            }
            return print_raw(&wire);
        }
    }
    Ok(())
}

pub fn print_raw(data: &[u8]) -> CliResult<()> {
    write_raw(&mut std::io::stdout().lock(), data)
}

fn write_raw<W: Write>(out: &mut W, data: &[u8]) -> CliResult<()> {
    out.write_all(data)
        .and_then(|()| out.flush())
        .map_err(|err| io_error("failed writing stdout", err))
}

fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
