use sipc_transport::Listener;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("sipc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: sipc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SIPC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("transport: {}", Listener::TRANSPORT_NAME);
    println!(
        "max_handles: {}",
        sipc_transport::DEFAULT_MAX_HANDLES
    );
    println!(
        "features: peer={}, json={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "json")
    );

    Ok(SUCCESS)
}
