//! Trace file loading shared by all commands

use std::path::Path;

use anyhow::{Context, Result};
use cputrace_core::{FileStream, Trace};

pub fn load_trace(path: &Path) -> Result<Trace> {
    let stream = FileStream::open(path)
        .with_context(|| format!("Failed to open trace: {}", path.display()))?;
    let trace = Trace::load(stream)
        .with_context(|| format!("Failed to read trace: {}", path.display()))?;
    tracing::debug!(path = %path.display(), words = trace.len(), "loaded trace");
    Ok(trace)
}
