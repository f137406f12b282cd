mod cmd;
mod exit;
mod logging;
mod output;
mod tokenize;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "sipc", version, about = "Simple IPC messages with handle passing")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "SIPC_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "SIPC_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "sipc",
            "send",
            "/tmp/test.sock",
            "open 3",
            "--attach",
            "/tmp/a.txt",
            "--attach",
            "/tmp/b.txt",
            "--wait",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.line, "open 3");
                assert_eq!(args.attach.len(), 2);
                assert!(args.wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_requires_a_line() {
        let err = Cli::try_parse_from(["sipc", "send", "/tmp/test.sock"])
            .expect_err("missing line should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_decode_without_file() {
        let cli = Cli::try_parse_from(["sipc", "--format", "json", "decode"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(ref args) if args.file.is_none()));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }

    #[test]
    fn parses_serve_with_greeting() {
        let cli = Cli::try_parse_from(["sipc", "serve", "/tmp/test.sock", "--greeting", "hi"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.greeting.as_deref() == Some("hi")));
    }
}
