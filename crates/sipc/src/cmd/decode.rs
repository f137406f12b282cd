use std::fs;
use std::io::Read;

use sipc_codec::parse_message;

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::{print_entries, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let (data, source) = match &args.file {
        Some(path) => (
            fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
            path.display().to_string(),
        ),
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .map_err(|err| io_error("failed reading stdin", err))?;
            (data, "stdin".to_string())
        }
    };

    let entries = parse_message(&data).map_err(|err| codec_error("decode failed", err))?;
    tracing::debug!(source = %source, entries = entries.len(), "decoded message");
    print_entries(&entries, 0, &source, format)?;
    Ok(SUCCESS)
}
