//! Lifecycle controller and producer handles.
//!
//! A [`Streamer`] owns the two queues for its whole life and one
//! [`StreamSession`] per `start`/`stop` cycle. Producers get an
//! [`AudioInput`] (one, real-time safe) and any number of [`VideoInput`]s;
//! both only ever touch the queues and a shared enabled flag, never the
//! controller lock.

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use tokio_util::sync::CancellationToken;

use crate::{
    audio_ring::{AudioReader, AudioSampleBuffer, AudioWriter, RingMonitor},
    codec::MediaBackend,
    config::{AUDIO_CHANNELS, PipelineOptions, StreamConfig},
    error::{Result, StreamError},
    frame::{PixelLayout, VideoFrame},
    frame_queue::{PushOutcome, VideoFrameQueue},
    session::StreamSession,
    stats::{AtomicSessionState, SessionState, StreamCounters, StreamStats},
    worker::EncodeWorker,
};

/// Interleaving chunk used by [`AudioInput::submit_planar`], in frames.
const PLANAR_CHUNK_FRAMES: usize = 256;

/// State shared by the controller, the producers and the worker.
pub(crate) struct Shared {
    pub(crate) state: AtomicSessionState,
    pub(crate) accepting: AtomicBool,
    pub(crate) counters: StreamCounters,
    pub(crate) video: VideoFrameQueue,
}

impl Shared {
    pub(crate) fn new(options: &PipelineOptions) -> Self {
        Self {
            state: AtomicSessionState::default(),
            accepting: AtomicBool::new(false),
            counters: StreamCounters::default(),
            video: VideoFrameQueue::new(options.video_capacity, options.drop_policy),
        }
    }

    fn accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

struct RunningWorker<B: MediaBackend> {
    cancel: CancellationToken,
    handle: JoinHandle<(StreamSession<B>, AudioReader)>,
}

struct Control<B: MediaBackend> {
    backend: B,
    /// Held here while idle, owned by the worker while streaming.
    reader: Option<AudioReader>,
    worker: Option<RunningWorker<B>>,
}

pub struct Streamer<B: MediaBackend + Clone> {
    options: PipelineOptions,
    shared: Arc<Shared>,
    ring: RingMonitor,
    control: Mutex<Control<B>>,
    audio_writer: Mutex<Option<AudioWriter>>,
}

impl<B: MediaBackend + Clone> Streamer<B> {
    pub fn new(backend: B, options: PipelineOptions) -> Self {
        let (writer, reader) = AudioSampleBuffer::with_capacity(options.audio_capacity);
        Self {
            shared: Arc::new(Shared::new(&options)),
            ring: reader.monitor(),
            control: Mutex::new(Control {
                backend,
                reader: Some(reader),
                worker: None,
            }),
            audio_writer: Mutex::new(Some(writer)),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The single audio producer handle. `None` once it has been taken.
    pub fn audio_input(&self) -> Option<AudioInput> {
        let writer = self
            .audio_writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        Some(AudioInput {
            writer,
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn video_input(&self) -> VideoInput {
        VideoInput {
            shared: Arc::clone(&self.shared),
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, Control<B>> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connects and starts the encode worker.
    ///
    /// Returns `Ok(false)` without touching anything when a session is
    /// already active. A connect failure is returned as
    /// [`StreamError::Connect`] and leaves the streamer idle and restartable.
    pub fn start(&self, config: StreamConfig) -> Result<bool> {
        let mut control = self.lock_control();
        let state = self.shared.state.load();
        if control.worker.is_some() || state != SessionState::Idle {
            log::warn!("start ignored, session is {:?}", state);
            return Ok(false);
        }
        config.validate()?;
        let Some(mut reader) = control.reader.take() else {
            return Err(StreamError::Worker(
                "audio reader was lost by a crashed worker".into(),
            ));
        };

        self.shared.state.store(SessionState::Connecting);
        log::info!("connecting to {}", config.url);
        let mut session = match StreamSession::connect(control.backend.clone(), config) {
            Ok(session) => session,
            Err(e) => {
                control.reader = Some(reader);
                self.shared.state.store(SessionState::Idle);
                log::error!("{}", e);
                return Err(e);
            }
        };

        // The ring holds one slot less than its capacity and must fit a whole chunk.
        let chunk = session.audio_frame_size() * session.audio_channels();
        let held = reader.capacity() - 1;
        if held < chunk {
            session.disconnect();
            control.reader = Some(reader);
            self.shared.state.store(SessionState::Idle);
            let e = StreamError::InvalidConfig(format!(
                "audio ring holds {} samples, encoder needs {} per chunk",
                held, chunk
            ));
            log::error!("{}", e);
            return Err(e);
        }

        reader.clear();
        self.shared.video.clear();
        self.shared.counters.reset();

        let cancel = CancellationToken::new();
        let worker = EncodeWorker::new(session, reader, Arc::clone(&self.shared));
        self.shared.state.store(SessionState::Streaming);
        match worker.spawn(cancel.clone(), self.options.poll_interval()) {
            Ok(handle) => {
                control.worker = Some(RunningWorker { cancel, handle });
            }
            Err(e) => {
                self.shared.state.store(SessionState::Idle);
                return Err(StreamError::Worker(format!(
                    "spawn encode worker: {}",
                    e
                )));
            }
        }
        self.shared.accepting.store(true, Ordering::Release);
        log::info!("streaming started");
        Ok(true)
    }

    /// Stops producers, joins the worker, tears the session down and
    /// discards whatever is still queued. A no-op when idle.
    pub fn stop(&self) {
        let mut control = self.lock_control();
        let Some(worker) = control.worker.take() else {
            return;
        };
        self.shared.accepting.store(false, Ordering::Release);
        self.shared.state.store(SessionState::Stopping);
        log::info!("stopping stream");

        worker.cancel.cancel();
        match worker.handle.join() {
            Ok((mut session, mut reader)) => {
                session.disconnect();
                let samples = reader.clear();
                if samples > 0 {
                    log::debug!("discarded {} queued audio samples", samples);
                }
                control.reader = Some(reader);
            }
            Err(_) => {
                log::error!("encode worker panicked, audio input stays disabled");
            }
        }
        let frames = self.shared.video.clear();
        if frames > 0 {
            log::debug!("discarded {} queued video frames", frames);
        }

        self.shared.state.store(SessionState::Idle);
        log::info!("stream stopped");
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    pub fn stats(&self) -> StreamStats {
        let c = &self.shared.counters;
        StreamStats {
            state: self.state(),
            video_frames_encoded: c.video_frames_encoded.load(Ordering::Relaxed),
            audio_chunks_encoded: c.audio_chunks_encoded.load(Ordering::Relaxed),
            packets_written: c.packets_written.load(Ordering::Relaxed),
            bytes_written: c.bytes_written.load(Ordering::Relaxed),
            video_frames_dropped: self.shared.video.dropped(),
            audio_samples_truncated: self.ring.truncated(),
            video_frames_discarded: c.video_frames_discarded.load(Ordering::Relaxed),
            audio_samples_discarded: c.audio_samples_discarded.load(Ordering::Relaxed),
            video_queue_len: self.shared.video.len(),
            audio_available: self.ring.available(),
        }
    }
}

impl<B: MediaBackend + Clone> Drop for Streamer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Result of offering a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// The queue was full; see [`crate::frame_queue::DropPolicy`].
    Dropped,
    /// No session is streaming; the frame was not copied.
    Ignored,
}

/// Real-time audio producer. Never blocks and never allocates.
pub struct AudioInput {
    writer: AudioWriter,
    shared: Arc<Shared>,
}

impl AudioInput {
    /// Queues interleaved stereo samples and returns how many were taken;
    /// 0 while no session is streaming. Only whole L/R pairs are accepted.
    pub fn submit_audio_samples(&mut self, samples: &[f32]) -> usize {
        if !self.shared.accepting() {
            return 0;
        }
        self.writer.push_frames(samples, AUDIO_CHANNELS)
    }

    /// Interleaves one buffer per channel into stereo and queues it.
    /// Returns the number of interleaved samples taken.
    pub fn submit_planar(&mut self, left: &[f64], right: &[f64]) -> usize {
        if !self.shared.accepting() {
            return 0;
        }
        let frames = left.len().min(right.len());
        let mut chunk = [0.0f32; PLANAR_CHUNK_FRAMES * AUDIO_CHANNELS];
        let mut accepted = 0;
        for (l, r) in left[..frames]
            .chunks(PLANAR_CHUNK_FRAMES)
            .zip(right[..frames].chunks(PLANAR_CHUNK_FRAMES))
        {
            let len = l.len() * AUDIO_CHANNELS;
            for (pair, (a, b)) in chunk[..len].chunks_exact_mut(2).zip(l.iter().zip(r)) {
                pair[0] = *a as f32;
                pair[1] = *b as f32;
            }
            let pushed = self.writer.push_frames(&chunk[..len], AUDIO_CHANNELS);
            accepted += pushed;
            if pushed < len {
                break;
            }
        }
        accepted
    }

    pub fn free(&self) -> usize {
        self.writer.free()
    }
}

/// Video producer handle. Cheap to clone; each submit takes the queue
/// mutex only for the push itself.
#[derive(Clone)]
pub struct VideoInput {
    shared: Arc<Shared>,
}

impl VideoInput {
    /// Copies the pixels into an owned frame and queues it. Nothing is
    /// copied while no session is streaming.
    pub fn submit_video_frame(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        layout: PixelLayout,
    ) -> Result<SubmitOutcome> {
        if !self.shared.accepting() {
            return Ok(SubmitOutcome::Ignored);
        }
        let frame = VideoFrame::copy_from(pixels, width, height, stride, layout)?;
        Ok(self.submit(frame))
    }

    pub fn submit(&self, frame: VideoFrame) -> SubmitOutcome {
        if !self.shared.accepting() {
            return SubmitOutcome::Ignored;
        }
        match self.shared.video.push(frame) {
            PushOutcome::Queued => SubmitOutcome::Queued,
            PushOutcome::Dropped => SubmitOutcome::Dropped,
        }
    }
}

#[cfg(test)]
#[path = "streamer_test.rs"]
mod streamer_test;
