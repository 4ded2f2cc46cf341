//! xtask automation tool for drover
//!
//! Run through the cargo alias: `cargo xtask gen-schemas`.

mod gen_schemas;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development automation tool for drover")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate JSON schemas for the wire protocol and configuration
    GenSchemas {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenSchemas { out } => gen_schemas::run(&out),
    }
}
