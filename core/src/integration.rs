//! Integration tests for the capture, persistence and replay pipeline
//!
//! Tests full sessions against in-memory and file-backed streams, chunked
//! capture, and replay of what was recorded.

#[cfg(test)]
mod tests {
    use crate::capture::{Capture, CaptureSession, PROTOCOL_VERSION, TRACE_MAGIC};
    use crate::command::{CommandHeader, Opcode};
    use crate::config::TraceConfig;
    use crate::context::Context;
    use crate::error::TraceError;
    use crate::fingerprint::Fingerprint;
    use crate::reader::{AccessWidth, Command, MemoryAccess, TraceHeader, decode_trace};
    use crate::replay::Replayer;
    use crate::stream::{FileStream, MemoryStream};
    use crate::test_utils::MockDevice;
    use crate::trace::Trace;

    // ============================================================================
    // End-to-end capture
    // ============================================================================

    #[test]
    fn test_end_to_end_scenario() {
        let mut device = MockDevice::new(3, 64);
        let mut stream = MemoryStream::new();
        let mut session = CaptureSession::new(&mut device, &mut stream).unwrap();
        session.execute().unwrap();
        session.write32(0x1000, 0x2A, 1);
        session.interrupt(0);
        let trace = session.finish().unwrap();

        let state: Vec<u8> = (0..64u8).collect();
        let decoded = decode_trace(trace.words()).unwrap();
        assert_eq!(
            decoded.header,
            TraceHeader {
                magic: TRACE_MAGIC,
                protocol_version: PROTOCOL_VERSION,
                device_version: 3,
                state_size: 64,
            }
        );
        assert_eq!(
            decoded.commands,
            vec![
                Command::SetState {
                    state: state.clone()
                },
                Command::Execute {
                    fingerprint: Fingerprint::of(&state)
                },
                Command::Access(MemoryAccess::write(AccessWidth::U32, 0x1000, 0x2A, 1)),
                Command::Interrupt { kind: 0 },
                Command::Footer,
            ]
        );

        // Header 5 + SetState 17 + Execute 5 + Write32 3 + Interrupt 2 + Footer 1
        assert_eq!(trace.len(), 33);
        assert_eq!(stream.as_bytes().len(), 33 * 4);

        let write = trace.words()[27];
        let header = CommandHeader::unpack(write).unwrap();
        assert_eq!(header.opcode, Opcode::Write32);
        assert_eq!(header.extra, 1);
        assert_eq!(header.blocks, 2);
        assert_eq!(&trace.words()[28..30], &[0x1000, 0x2A]);
    }

    #[test]
    fn test_state_blob_bytes_appear_verbatim_on_disk() {
        let mut device = MockDevice::new(1, 6);
        let mut stream = MemoryStream::new();
        let mut session = CaptureSession::new(&mut device, &mut stream).unwrap();
        session.execute().unwrap();
        session.finish().unwrap();

        // SetState header word follows the 5-word Header.
        let bytes = stream.as_bytes();
        assert_eq!(&bytes[24..32], &[0, 1, 2, 3, 4, 5, 0, 0]);
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.trace");

        let mut device = MockDevice::new(9, 20);
        let mut session =
            CaptureSession::new(&mut device, FileStream::create(&path).unwrap()).unwrap();
        for i in 0..100u32 {
            session.execute().unwrap();
            session.read16(i, (i * 3) as u16, 2);
            if i % 25 == 0 {
                session.invalidate_state();
            }
        }
        let trace = session.finish().unwrap();

        let loaded = Trace::load(FileStream::open(&path).unwrap()).unwrap();
        assert_eq!(loaded.words(), trace.words());

        let decoded = decode_trace(loaded.words()).unwrap();
        assert_eq!(decoded.steps(), 100);
        let set_states = decoded
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SetState { .. }))
            .count();
        assert_eq!(set_states, 5);
    }

    #[test]
    fn test_chunked_capture_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let context = Context::new(TraceConfig {
            initial_capacity_words: 64,
            flush_threshold_words: 100,
            output_dir: Some(dir.path().to_path_buf()),
        });

        let mut session = context
            .start_capture(MockDevice::new(2, 32), "chunked.trace")
            .unwrap();
        for i in 0..500u32 {
            session.execute().unwrap();
            session.write8(i, i as u8, 0);
            session.signal(i % 3);
        }
        let trace = session.finish().unwrap();
        assert!(trace.chunks().len() > 10);

        let loaded = context.load_trace("chunked.trace").unwrap();
        assert_eq!(loaded.words(), trace.words());
        assert!(decode_trace(loaded.words()).unwrap().terminated);
    }

    #[test]
    fn test_truncated_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.trace");
        let mut device = MockDevice::new(1, 8);
        let mut session =
            CaptureSession::new(&mut device, FileStream::create(&path).unwrap()).unwrap();
        session.execute().unwrap();
        session.finish().unwrap();

        // Cut inside the Execute fingerprint.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 12]).unwrap();

        let loaded = Trace::load(FileStream::open(&path).unwrap()).unwrap();
        let err = decode_trace(loaded.words()).unwrap_err();
        assert!(err.is_truncation());

        // A cut that is not word aligned fails at load time.
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            Trace::load(FileStream::open(&path).unwrap()),
            Err(TraceError::TruncatedStream { .. })
        ));
    }

    // ============================================================================
    // Replay
    // ============================================================================

    #[test]
    fn test_capture_then_replay() {
        let mut recorded = MockDevice::new(4, 16);
        let mut session = CaptureSession::new(&mut recorded, MemoryStream::new()).unwrap();
        for i in 0..8u32 {
            session.execute().unwrap();
            session.write8(i, 0xF0 | i as u8, 0);
            session.device_mut().poke(i as usize, 0xF0 | i as u8);
        }
        session.execute().unwrap();
        let trace = session.finish().unwrap();

        let mut device = MockDevice::new(4, 16);
        device.state.fill(0xAA);
        let summary = Replayer::new(&mut device, trace.words())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.steps, 9);
        assert_eq!(summary.state_loads, 1);
        assert!(summary.terminated);
        assert_eq!(device.state, recorded.state);
    }

    #[test]
    fn test_replay_detects_tampered_fingerprint() {
        let mut device = MockDevice::new(1, 8);
        let mut session = CaptureSession::new(&mut device, MemoryStream::new()).unwrap();
        session.execute().unwrap();
        session.execute().unwrap();
        let trace = session.finish().unwrap();

        // Flip a bit in the second Execute's fingerprint.
        let mut words = trace.words().to_vec();
        let second_execute = 5 + 3 + 5 + 1;
        words[second_execute] ^= 1;

        let err = Replayer::new(MockDevice::new(1, 8), &words)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, TraceError::StateDivergence { step: 1, .. }));
    }
}
