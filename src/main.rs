use anyhow::Result;
use tracing::{error, info};

mod browser;
mod cli;
mod fetch;
mod schedule;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();
    utils::logging::init_logging(&utils::logging::LogOptions {
        verbose: args.verbose,
        file: args.log_file.clone(),
        filter: args.log_filter.clone(),
    })?;

    info!("Starting rendercrawl v{}", env!("CARGO_PKG_VERSION"));

    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
