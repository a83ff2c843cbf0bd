//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "duelhall", about = "Duel session runtime tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse and validate a config file, then print the effective config
    CheckConfig {
        path: PathBuf,
    },
    /// Replay a JSON scenario against in-memory collaborators and print the report
    Replay(ReplayOpts),
}

#[derive(clap::Args)]
pub struct ReplayOpts {
    pub scenario: PathBuf,

    /// Config file whose settings and templates the scenario runs with
    #[arg(long, short = 'c', env = "DUELHALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}
