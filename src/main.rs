use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use tunnel_client::{logging, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", tunnel_client::VERSION);
        return ExitCode::SUCCESS;
    }

    logging::init();
    let settings = cli.into_settings();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(tunnel_client::run(settings));
    runtime.shutdown_timeout(Duration::from_secs(1));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            // The log sink may point at a file by now.
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
