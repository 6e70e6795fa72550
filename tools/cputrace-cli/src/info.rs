//! Info command - summarize a trace file

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cputrace_core::{Command, Trace, TraceHeader, TraceReader};
use serde::Serialize;

use crate::input::load_trace;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Trace file to inspect
    pub trace: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct TraceInfo {
    pub header: TraceHeader,
    pub words: usize,
    pub bytes: u64,
    /// Commands after the Header, Footer included.
    pub commands: u64,
    pub steps: u64,
    /// Command count per opcode name.
    pub counts: BTreeMap<&'static str, u64>,
    pub terminated: bool,
}

/// Decode the whole trace and count its commands.
pub fn summarize(trace: &Trace) -> cputrace_core::Result<TraceInfo> {
    let mut reader = TraceReader::new(trace.words())?;
    let mut counts = BTreeMap::new();
    let mut commands = 0;
    let mut steps = 0;
    while let Some(command) = reader.next_command()? {
        if matches!(command, Command::Execute { .. }) {
            steps += 1;
        }
        commands += 1;
        *counts.entry(command.opcode().name()).or_insert(0) += 1;
    }
    Ok(TraceInfo {
        header: *reader.header(),
        words: trace.len(),
        bytes: trace.byte_len(),
        commands,
        steps,
        counts,
        terminated: reader.is_terminated(),
    })
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<()> {
    let trace = load_trace(&args.trace)?;
    let info = summarize(&trace)
        .with_context(|| format!("Failed to decode trace: {}", args.trace.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Trace: {}", args.trace.display());
    println!("  Magic:           {:#010x}", info.header.magic);
    println!("  Protocol:        {}", info.header.protocol_version);
    println!("  Device version:  {}", info.header.device_version);
    println!("  State size:      {} bytes", info.header.state_size);
    println!("  Size:            {} words ({} bytes)", info.words, info.bytes);
    println!("  Commands:        {}", info.commands);
    println!("  Steps:           {}", info.steps);
    println!(
        "  Footer:          {}",
        if info.terminated { "present" } else { "MISSING" }
    );
    if !info.counts.is_empty() {
        println!("  Counts:");
        for (name, count) in &info.counts {
            println!("    {:<12} {}", name, count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputrace_core::{AccessWidth, Fingerprint, MemoryAccess};

    fn sample() -> Trace {
        let mut words = Vec::new();
        for command in [
            Command::Header(TraceHeader::new(3, 4)),
            Command::SetState {
                state: vec![1, 2, 3, 4],
            },
            Command::Execute {
                fingerprint: Fingerprint::of(&[1, 2, 3, 4]),
            },
            Command::Access(MemoryAccess::write(AccessWidth::U8, 0x10, 1, 0)),
            Command::Access(MemoryAccess::write(AccessWidth::U8, 0x11, 2, 0)),
            Command::Execute {
                fingerprint: Fingerprint::default(),
            },
            Command::Footer,
        ] {
            command.encode(&mut words).unwrap();
        }
        Trace::from_words(words)
    }

    #[test]
    fn test_summarize_counts() {
        let info = summarize(&sample()).unwrap();
        assert_eq!(info.header.device_version, 3);
        assert_eq!(info.commands, 6);
        assert_eq!(info.steps, 2);
        assert_eq!(info.counts["Write8"], 2);
        assert_eq!(info.counts["Footer"], 1);
        assert!(!info.counts.contains_key("Header"));
        assert!(info.terminated);
    }

    #[test]
    fn test_summary_json() {
        let info = summarize(&sample()).unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["header"]["state_size"], 4);
        assert_eq!(json["counts"]["Execute"], 2);
        assert_eq!(json["terminated"], true);
    }
}
