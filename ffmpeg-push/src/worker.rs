use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::{
    audio_ring::AudioReader,
    codec::MediaBackend,
    error::StreamError,
    session::{StreamSession, Written},
    stats::{SessionState, StreamCounters},
    streamer::Shared,
};

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub video_frames: usize,
    pub audio_chunks: usize,
    pub discarded_frames: usize,
    pub discarded_samples: usize,
}

/// Background consumer: the only code that touches the session while
/// streaming.
pub struct EncodeWorker<B: MediaBackend> {
    session: StreamSession<B>,
    audio: AudioReader,
    shared: Arc<Shared>,
    /// One encoder frame of interleaved samples, allocated once.
    scratch: Vec<f32>,
    failed: bool,
}

impl<B: MediaBackend> EncodeWorker<B> {
    pub(crate) fn new(session: StreamSession<B>, audio: AudioReader, shared: Arc<Shared>) -> Self {
        let chunk = session.audio_frame_size() * session.audio_channels();
        Self {
            session,
            audio,
            shared,
            scratch: vec![0.0; chunk],
            failed: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Encodes every queued video frame, then every whole audio chunk.
    /// Once failed, both queues are still emptied but nothing is encoded.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let shared = Arc::clone(&self.shared);
        let counters = &shared.counters;

        for frame in shared.video.pop_all() {
            if self.failed {
                report.discarded_frames += 1;
                continue;
            }
            match self.session.encode_video_frame(&frame) {
                Ok(written) => {
                    report.video_frames += 1;
                    account(counters, written);
                }
                Err(e) => {
                    report.discarded_frames += 1;
                    self.fail(e);
                }
            }
        }

        let frame_size = self.session.audio_frame_size();
        while !self.failed && self.audio.pop(&mut self.scratch) {
            match self.session.encode_audio_chunk(&self.scratch, frame_size) {
                Ok(written) => {
                    report.audio_chunks += 1;
                    account(counters, written);
                }
                Err(e) => {
                    report.discarded_samples += self.scratch.len();
                    self.fail(e);
                }
            }
        }
        if self.failed {
            report.discarded_samples += self.audio.clear();
        }

        StreamCounters::add(&counters.video_frames_encoded, report.video_frames as u64);
        StreamCounters::add(&counters.audio_chunks_encoded, report.audio_chunks as u64);
        StreamCounters::add(
            &counters.video_frames_discarded,
            report.discarded_frames as u64,
        );
        StreamCounters::add(
            &counters.audio_samples_discarded,
            report.discarded_samples as u64,
        );
        report
    }

    fn fail(&mut self, err: StreamError) {
        log::error!("stream failed: {}", err);
        self.failed = true;
        if self
            .shared
            .state
            .transition(SessionState::Streaming, SessionState::Failed)
        {
            log::warn!("encode worker draining input until stop");
        }
    }

    /// Polls until `cancel` fires, then hands the session and the audio
    /// reader back for teardown.
    pub fn run(mut self, cancel: CancellationToken, poll: Duration) -> (StreamSession<B>, AudioReader) {
        log::info!(
            "encode worker started, audio chunk {} samples, poll {:?}",
            self.scratch.len(),
            poll
        );
        let started = Instant::now();
        let mut cycles: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.run_cycle();
            cycles += 1;
            std::thread::sleep(poll);
        }
        log::info!(
            "encode worker finished after {} cycles in {:?}, failed: {}",
            cycles,
            started.elapsed(),
            self.failed
        );
        (self.session, self.audio)
    }

    pub fn spawn(
        self,
        cancel: CancellationToken,
        poll: Duration,
    ) -> std::io::Result<JoinHandle<(StreamSession<B>, AudioReader)>> {
        std::thread::Builder::new()
            .name("encode-worker".to_string())
            .spawn(move || self.run(cancel, poll))
    }
}

fn account(counters: &StreamCounters, written: Written) {
    StreamCounters::add(&counters.packets_written, written.packets);
    StreamCounters::add(&counters.bytes_written, written.bytes);
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
