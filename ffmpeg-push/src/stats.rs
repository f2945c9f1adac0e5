use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Stopping,
    Failed,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Streaming,
            3 => SessionState::Stopping,
            4 => SessionState::Failed,
            _ => SessionState::Idle,
        }
    }
}

impl From<SessionState> for u8 {
    fn from(value: SessionState) -> Self {
        match value {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Streaming => 2,
            SessionState::Stopping => 3,
            SessionState::Failed => 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn load(&self) -> SessionState {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state.into(), Ordering::Release);
    }

    /// Moves to `to` only from `from`; returns whether it did.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from.into(), to.into(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Worker-side counters, reset on every `start`.
#[derive(Debug, Default)]
pub struct StreamCounters {
    pub video_frames_encoded: AtomicU64,
    pub audio_chunks_encoded: AtomicU64,
    pub packets_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub video_frames_discarded: AtomicU64,
    pub audio_samples_discarded: AtomicU64,
}

impl StreamCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.video_frames_encoded,
            &self.audio_chunks_encoded,
            &self.packets_written,
            &self.bytes_written,
            &self.video_frames_discarded,
            &self.audio_samples_discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of the pipeline for observers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    pub state: SessionState,
    pub video_frames_encoded: u64,
    pub audio_chunks_encoded: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    /// Frames refused by the full video queue.
    pub video_frames_dropped: u64,
    /// Samples cut off by the full audio ring.
    pub audio_samples_truncated: u64,
    /// Frames and samples thrown away while the session was failed or stopping.
    pub video_frames_discarded: u64,
    pub audio_samples_discarded: u64,
    pub video_queue_len: usize,
    pub audio_available: usize,
}
