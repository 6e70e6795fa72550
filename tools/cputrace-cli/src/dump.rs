//! Dump command - print decoded commands

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cputrace_core::{AccessDirection, Command, TraceReader};
use serde::Serialize;

use crate::input::load_trace;

/// Arguments for the dump command
#[derive(Args)]
pub struct DumpArgs {
    /// Trace file to dump
    pub trace: PathBuf,

    /// Emit one JSON object per line instead of text
    #[arg(long)]
    pub json: bool,

    /// Stop after this many commands (Header excluded)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

/// One JSON line of output.
#[derive(Serialize)]
struct DumpLine<'a> {
    /// Word offset of the command.
    offset: usize,
    #[serde(flatten)]
    command: &'a Command,
}

/// Execute the dump command
pub fn execute(args: DumpArgs) -> Result<()> {
    let trace = load_trace(&args.trace)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    dump(trace.words(), args.json, args.limit, &mut out)
        .with_context(|| format!("Failed to decode trace: {}", args.trace.display()))?;
    out.flush()?;
    Ok(())
}

fn dump(words: &[u32], json: bool, limit: Option<usize>, out: &mut impl Write) -> Result<()> {
    let mut reader = TraceReader::new(words)?;
    let header = *reader.header();
    if json {
        let line = DumpLine {
            offset: 0,
            command: &Command::Header(header),
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    } else {
        writeln!(
            out,
            "{:>8}  Header     magic={:#010x} protocol={} device_version={} state_size={}",
            0, header.magic, header.protocol_version, header.device_version, header.state_size
        )?;
    }

    let mut printed = 0;
    loop {
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        let offset = reader.cursor();
        let Some(command) = reader.next_command()? else {
            break;
        };
        if json {
            let line = DumpLine {
                offset,
                command: &command,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        } else {
            writeln!(out, "{:>8}  {}", offset, describe(&command))?;
        }
        printed += 1;
    }

    if !json && limit.is_none() && !reader.is_terminated() {
        writeln!(out, "          (no footer)")?;
    }
    Ok(())
}

fn describe(command: &Command) -> String {
    let name = command.opcode().name();
    match command {
        Command::Header(header) => format!(
            "{:<10} magic={:#010x} protocol={}",
            name, header.magic, header.protocol_version
        ),
        Command::Footer => name.to_string(),
        Command::SetState { state } => format!("{:<10} {} bytes", name, state.len()),
        Command::Execute { fingerprint } => format!("{:<10} {}", name, fingerprint),
        Command::Interrupt { kind } | Command::Signal { kind } => {
            format!("{:<10} kind={}", name, kind)
        }
        Command::Access(access) => {
            let arrow = match access.direction {
                AccessDirection::Read => "->",
                AccessDirection::Write => "<-",
            };
            format!(
                "{:<10} [{:#010x}] {} {:#x} kind={}",
                name, access.addr, arrow, access.value, access.kind
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputrace_core::{AccessWidth, Fingerprint, MemoryAccess, TraceHeader};

    fn sample_words(terminated: bool) -> Vec<u32> {
        let mut words = Vec::new();
        let mut commands = vec![
            Command::Header(TraceHeader::new(1, 4)),
            Command::SetState {
                state: vec![9, 9, 9, 9],
            },
            Command::Execute {
                fingerprint: Fingerprint::of(&[9, 9, 9, 9]),
            },
            Command::Access(MemoryAccess::read(AccessWidth::U32, 0x8000, 0xCAFE, 1)),
            Command::Interrupt { kind: 1 },
        ];
        if terminated {
            commands.push(Command::Footer);
        }
        for command in commands {
            command.encode(&mut words).unwrap();
        }
        words
    }

    fn run(words: &[u32], json: bool, limit: Option<usize>) -> String {
        let mut out = Vec::new();
        dump(words, json, limit, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_dump_offsets() {
        let text = run(&sample_words(true), false, None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].trim_start().starts_with("0  Header"));
        assert!(lines[1].trim_start().starts_with("5  SetState"));
        assert!(lines[2].trim_start().starts_with("7  Execute"));
        assert!(lines[3].contains("[0x00008000] -> 0xcafe kind=1"));
        assert!(lines[5].trim_start().starts_with("17  Footer"));
    }

    #[test]
    fn test_limit_and_missing_footer() {
        assert_eq!(run(&sample_words(true), false, Some(2)).lines().count(), 3);
        let text = run(&sample_words(false), false, None);
        assert!(text.ends_with("(no footer)\n"));
    }

    #[test]
    fn test_json_lines() {
        let text = run(&sample_words(true), true, None);
        let values: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(values.len(), 6);
        assert_eq!(values[0]["op"], "Header");
        assert_eq!(values[0]["state_size"], 4);
        assert_eq!(values[3]["op"], "Access");
        assert_eq!(values[3]["addr"], 0x8000);
        assert_eq!(values[3]["offset"], 12);
    }

    #[test]
    fn test_bad_header_is_an_error() {
        let mut out = Vec::new();
        assert!(dump(&[0xFF], false, None, &mut out).is_err());
    }
}
