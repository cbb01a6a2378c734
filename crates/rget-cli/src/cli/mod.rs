//! CLI for the rget multi-source fetcher.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rget_core::config;
use std::path::PathBuf;

use commands::{run_get, run_probe};

/// Top-level CLI for the rget multi-source fetcher.
#[derive(Debug, Parser)]
#[command(name = "rget")]
#[command(about = "rget: parallel multi-source HTTP range fetcher", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch one object from a set of candidate endpoint URLs.
    Get {
        /// Candidate download URLs for the same object.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output path (default: derived from the first URL).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Range size in bytes per fetch job (overrides config).
        #[arg(long, value_name = "BYTES")]
        range_size: Option<u64>,

        /// Suppress the progress line.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Probe candidate endpoints and list the usable ones.
    Probe {
        /// Candidate endpoint URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { urls, output, range_size, quiet } => {
                if let Some(bytes) = range_size {
                    cfg.range_size = bytes;
                }
                run_get(&cfg, &urls, output, quiet).await?;
            }
            CliCommand::Probe { urls } => run_probe(&cfg, &urls).await?,
        }

        Ok(())
    }
}
