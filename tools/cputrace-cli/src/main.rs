//! cputrace CLI - Inspect and verify CPU trace files
//!
//! # Commands
//!
//! - `cputrace info` - Header, command counts and footer status
//! - `cputrace dump` - Print decoded commands (text or JSON lines)
//! - `cputrace verify` - Structural check, non-zero exit on any problem
//!
//! # Usage
//!
//! ```bash
//! cputrace info run.trace
//! cputrace dump run.trace --limit 50
//! cputrace dump run.trace --json > run.jsonl
//! cputrace verify run.trace --allow-unterminated
//! ```
//!
//! Set `RUST_LOG=debug` for decoder diagnostics.

mod dump;
mod info;
mod input;
mod verify;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// cputrace CLI - Inspect and verify CPU trace files
#[derive(Parser)]
#[command(name = "cputrace")]
#[command(about = "Inspect and verify CPU trace files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the trace header, command counts and footer status
    Info(info::InfoArgs),

    /// Print every decoded command
    Dump(dump::DumpArgs),

    /// Check that the trace decodes cleanly and is terminated
    Verify(verify::VerifyArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => info::execute(args),
        Commands::Dump(args) => dump::execute(args),
        Commands::Verify(args) => verify::execute(args),
    }
}
