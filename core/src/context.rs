//! File-level entry points

use std::path::Path;

use crate::capture::CaptureSession;
use crate::config::TraceConfig;
use crate::device::CaptureDevice;
use crate::error::Result;
use crate::stream::FileStream;
use crate::trace::Trace;

/// Opens trace files according to a [`TraceConfig`].
///
/// Relative paths resolve against the config's `output_dir`.
#[derive(Debug, Clone, Default)]
pub struct Context {
    config: TraceConfig,
}

impl Context {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    /// Build a context from the user's `cputrace.toml`, or defaults.
    pub fn from_user_config() -> Self {
        Self::new(crate::config::load())
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Create (or truncate) `path` and start recording `device` into it.
    pub fn start_capture<D: CaptureDevice>(
        &self,
        device: D,
        path: impl AsRef<Path>,
    ) -> Result<CaptureSession<D, FileStream>> {
        let path = self.config.resolve_path(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "opening trace for capture");
        let stream = FileStream::create(&path)?;
        CaptureSession::with_config(device, stream, &self.config)
    }

    pub fn load_trace(&self, path: impl AsRef<Path>) -> Result<Trace> {
        let path = self.config.resolve_path(path);
        Trace::load(FileStream::open(&path)?)
    }

    pub fn save_trace(&self, trace: &Trace, path: impl AsRef<Path>) -> Result<()> {
        let path = self.config.resolve_path(path);
        trace.save(FileStream::create(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;
    use crate::error::TraceError;
    use crate::test_utils::MockDevice;

    fn context_in(dir: &Path) -> Context {
        Context::new(TraceConfig {
            output_dir: Some(dir.to_path_buf()),
            ..TraceConfig::default()
        })
    }

    #[test]
    fn test_capture_lands_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let context = context_in(dir.path());

        let mut session = context
            .start_capture(MockDevice::new(1, 8), "runs/first.trace")
            .unwrap();
        session.execute().unwrap();
        let trace = session.finish().unwrap();

        let on_disk = dir.path().join("runs").join("first.trace");
        assert_eq!(std::fs::metadata(&on_disk).unwrap().len(), trace.byte_len());
        assert_eq!(
            context.load_trace("runs/first.trace").unwrap().words(),
            trace.words()
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let context = context_in(dir.path());
        let trace = Trace::from_words(vec![7, 8, 9]);
        context.save_trace(&trace, "copy.trace").unwrap();
        assert_eq!(context.load_trace("copy.trace").unwrap().words(), &[7, 8, 9]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = context_in(dir.path()).load_trace("nope.trace").unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
