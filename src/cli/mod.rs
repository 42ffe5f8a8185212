pub mod commands;
pub mod config;

use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Extra log filter directives, comma separated (e.g. "hyper=off")
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a single page through the rendering engine
    Fetch {
        /// Target URL to fetch
        #[arg(required = true)]
        url: String,

        /// Configuration profile to use
        #[arg(short, long)]
        profile: Option<String>,

        /// Write the rendered page source to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch a file of URLs as one batch
    Batch {
        /// File with one URL per line
        #[arg(required = true)]
        file: PathBuf,

        /// Batch id used by the scheduler rotation
        #[arg(short, long, default_value_t = 1)]
        batch_id: u32,

        /// Concurrent fetches, overriding the profile
        #[arg(short, long)]
        workers: Option<usize>,

        /// Configuration profile to use
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to show
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Fetch {
            url,
            profile,
            output,
        } => {
            info!("Fetching {}", url);
            commands::fetch(url, profile, output).await
        }
        Commands::Batch {
            file,
            batch_id,
            workers,
            profile,
        } => {
            info!("Fetching batch {} from {}", batch_id, file.display());
            commands::batch(file, batch_id, workers, profile).await
        }
        Commands::Config { profile, list } => {
            if list {
                commands::list_profiles().await
            } else if let Some(profile_name) = profile {
                commands::show_profile(profile_name).await
            } else {
                commands::show_config().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }
}
