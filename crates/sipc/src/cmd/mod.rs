use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept peers, print their requests and answer each one.
    Serve(ServeArgs),
    /// Send a single request.
    Send(SendArgs),
    /// Print the wire form of a request line.
    Encode(EncodeArgs),
    /// Parse wire bytes and print the entries.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to listen on (socket path, or pipe name on Windows).
    pub endpoint: String,
    /// Text written into every handle a request carries.
    #[arg(long)]
    pub greeting: Option<String>,
    /// Exit after answering N requests.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Request values, e.g. `open "notes.txt" [1 2] {mode: rw}`.
    pub line: String,
    /// File to open and pass along with the request. Repeatable.
    #[arg(long, value_name = "PATH")]
    pub attach: Vec<PathBuf>,
    /// Wait for the reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Request values to encode.
    pub line: String,
    /// Entry type to emit.
    #[arg(long, value_enum, default_value = "request")]
    pub kind: EntryKind,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum EntryKind {
    Request,
    Success,
    Error,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding wire bytes. Reads stdin when absent.
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
