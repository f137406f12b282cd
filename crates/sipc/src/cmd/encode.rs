use sipc_codec::{build_entry, EntryType};

use crate::cmd::{EncodeArgs, EntryKind};
use crate::exit::{CliResult, SUCCESS};
use crate::output::print_raw;
use crate::tokenize::parse_line;

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let values = parse_line(&args.line)?;
    let kind = match args.kind {
        EntryKind::Request => EntryType::Request,
        EntryKind::Success => EntryType::Success,
        EntryKind::Error => EntryType::Error,
    };
    print_raw(&build_entry(kind, &values))?;
    Ok(SUCCESS)
}
