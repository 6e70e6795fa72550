//! Verify command - structural check of a trace file
//!
//! Decodes every command and checks the trace is terminated. Any failure
//! makes the process exit non-zero.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use cputrace_core::{DecodedTrace, decode_trace};

use crate::input::load_trace;

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// Trace file to verify
    pub trace: PathBuf,

    /// Accept a trace that ends without a Footer
    #[arg(long)]
    pub allow_unterminated: bool,
}

/// Execute the verify command
pub fn execute(args: VerifyArgs) -> Result<()> {
    let trace = load_trace(&args.trace)?;
    let decoded = check(trace.words(), args.allow_unterminated)
        .with_context(|| format!("Verification failed: {}", args.trace.display()))?;

    println!(
        "OK: {} ({} commands, {} steps{})",
        args.trace.display(),
        decoded.commands.len(),
        decoded.steps(),
        if decoded.terminated { "" } else { ", unterminated" }
    );
    Ok(())
}

fn check(words: &[u32], allow_unterminated: bool) -> Result<DecodedTrace> {
    let decoded = decode_trace(words)?;
    if !decoded.terminated && !allow_unterminated {
        bail!("trace has no footer (capture was not finalized)");
    }
    Ok(decoded)
}
