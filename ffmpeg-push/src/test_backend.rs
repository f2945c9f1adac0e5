//! Recording media backend for tests: every encoder emits one packet per
//! submitted frame and every call is logged on a shared [`Recorder`].

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use anyhow::bail;
use bytes::Bytes;

use crate::{
    codec::{AudioEncoder, FrameScaler, MediaBackend, Muxer, ScalerSpec, VideoEncoder},
    config::StreamConfig,
    frame::VideoFrame,
    packet::{EncodedPacket, StreamKind, TimeBase},
};

/// Stream time base of the fake container, FLV-like.
pub const MUX_TIME_BASE: TimeBase = TimeBase::new(1, 1000);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenMuxer(String),
    OpenVideo,
    OpenAudio,
    WriteHeader,
    BuildScaler(ScalerSpec),
    SendPicture { pts: i64, width: u32, height: u32 },
    SendAudio { pts: i64, samples: usize, left: Vec<f32>, right: Vec<f32> },
    VideoEof,
    AudioEof,
    WritePacket { kind: StreamKind, pts: Option<i64> },
    WriteTrailer,
    CloseMuxer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    OpenMuxer,
    OpenVideo,
    OpenAudio,
    WriteHeader,
    /// Fails the n-th (0-based) video submit.
    SendPicture(usize),
    /// Fails the n-th (0-based) packet write.
    WritePacket(usize),
    WriteTrailer,
}

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn video_pts(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendPicture { pts, .. } => Some(pts),
                _ => None,
            })
            .collect()
    }

    pub fn audio_pts(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendAudio { pts, .. } => Some(pts),
                _ => None,
            })
            .collect()
    }

    pub fn written(&self, kind: StreamKind) -> Vec<Option<i64>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WritePacket { kind: k, pts } if k == kind => Some(pts),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct TestBackend {
    pub recorder: Arc<Recorder>,
    pub audio_frame_size: usize,
    pub audio_channels: usize,
    /// Pictures the video encoder holds back until flushed.
    pub video_delay: usize,
    /// Shared by clones so a test can clear it between starts.
    fail_at: Arc<Mutex<Option<FailAt>>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            audio_frame_size: 1024,
            audio_channels: 2,
            video_delay: 0,
            fail_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_audio_frame_size(mut self, frame_size: usize) -> Self {
        self.audio_frame_size = frame_size;
        self
    }

    pub fn with_audio_channels(mut self, channels: usize) -> Self {
        self.audio_channels = channels;
        self
    }

    pub fn with_video_delay(mut self, delay: usize) -> Self {
        self.video_delay = delay;
        self
    }

    pub fn failing_at(self, fail_at: FailAt) -> Self {
        *self.fail_at.lock().unwrap() = Some(fail_at);
        self
    }

    pub fn clear_failure(&self) {
        *self.fail_at.lock().unwrap() = None;
    }

    fn failure(&self) -> Option<FailAt> {
        *self.fail_at.lock().unwrap()
    }

    fn fails(&self, step: FailAt) -> bool {
        self.failure() == Some(step)
    }
}

pub struct TestPicture {
    width: u32,
    height: u32,
}

pub struct TestScaler {
    spec: ScalerSpec,
}

impl FrameScaler for TestScaler {
    type Picture = TestPicture;

    fn scale(&mut self, frame: &VideoFrame) -> anyhow::Result<TestPicture> {
        if frame.width() != self.spec.src_width || frame.height() != self.spec.src_height {
            bail!("scaler built for another source size");
        }
        Ok(TestPicture {
            width: self.spec.dst_width,
            height: self.spec.dst_height,
        })
    }
}

pub struct TestVideoEncoder {
    recorder: Arc<Recorder>,
    time_base: TimeBase,
    delay: usize,
    pending: VecDeque<i64>,
    eof: bool,
    sent: usize,
    fail_send: Option<usize>,
}

impl VideoEncoder for TestVideoEncoder {
    type Picture = TestPicture;

    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn send_picture(&mut self, picture: TestPicture, pts: i64) -> anyhow::Result<()> {
        let index = self.sent;
        self.sent += 1;
        if self.fail_send == Some(index) {
            bail!("encoder rejected picture {}", index);
        }
        self.recorder.record(Call::SendPicture {
            pts,
            width: picture.width,
            height: picture.height,
        });
        self.pending.push_back(pts);
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.recorder.record(Call::VideoEof);
        self.eof = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        if !self.eof && self.pending.len() <= self.delay {
            return Ok(None);
        }
        Ok(self.pending.pop_front().map(|pts| {
            EncodedPacket::new(Bytes::from_static(b"h264"), Some(pts), Some(pts), self.time_base)
                .with_key(pts == 0)
                .with_duration(1)
        }))
    }
}

pub struct TestAudioEncoder {
    recorder: Arc<Recorder>,
    time_base: TimeBase,
    frame_size: usize,
    channels: usize,
    pending: VecDeque<(i64, usize)>,
}

impl AudioEncoder for TestAudioEncoder {
    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn send_samples(
        &mut self,
        planes: &[Vec<f32>],
        samples: usize,
        pts: i64,
    ) -> anyhow::Result<()> {
        self.recorder.record(Call::SendAudio {
            pts,
            samples,
            left: planes[0][..samples].to_vec(),
            right: planes[1][..samples].to_vec(),
        });
        self.pending.push_back((pts, samples));
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.recorder.record(Call::AudioEof);
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        Ok(self.pending.pop_front().map(|(pts, samples)| {
            EncodedPacket::new(Bytes::from_static(b"aac"), Some(pts), Some(pts), self.time_base)
                .with_key(true)
                .with_duration(samples as i64)
        }))
    }
}

pub struct TestMuxer {
    recorder: Arc<Recorder>,
    writes: usize,
    fail_header: bool,
    fail_write: Option<usize>,
    fail_trailer: bool,
}

impl Muxer for TestMuxer {
    fn write_header(&mut self) -> anyhow::Result<()> {
        if self.fail_header {
            bail!("handshake rejected");
        }
        self.recorder.record(Call::WriteHeader);
        Ok(())
    }

    fn stream_time_base(&self, _kind: StreamKind) -> TimeBase {
        MUX_TIME_BASE
    }

    fn write_packet(&mut self, kind: StreamKind, packet: EncodedPacket) -> anyhow::Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_write == Some(index) {
            bail!("broken pipe");
        }
        if packet.time_base() != MUX_TIME_BASE {
            bail!("packet not rescaled to the stream time base");
        }
        self.recorder.record(Call::WritePacket {
            kind,
            pts: packet.pts(),
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        self.recorder.record(Call::WriteTrailer);
        if self.fail_trailer {
            bail!("connection reset");
        }
        Ok(())
    }
}

impl Drop for TestMuxer {
    fn drop(&mut self) {
        self.recorder.record(Call::CloseMuxer);
    }
}

impl MediaBackend for TestBackend {
    type Picture = TestPicture;
    type Scaler = TestScaler;
    type Video = TestVideoEncoder;
    type Audio = TestAudioEncoder;
    type Muxer = TestMuxer;

    fn open_muxer(&mut self, config: &StreamConfig) -> anyhow::Result<TestMuxer> {
        if self.fails(FailAt::OpenMuxer) {
            bail!("connection refused");
        }
        self.recorder.record(Call::OpenMuxer(config.url.clone()));
        let fail_write = match self.failure() {
            Some(FailAt::WritePacket(n)) => Some(n),
            _ => None,
        };
        Ok(TestMuxer {
            recorder: Arc::clone(&self.recorder),
            writes: 0,
            fail_header: self.fails(FailAt::WriteHeader),
            fail_write,
            fail_trailer: self.fails(FailAt::WriteTrailer),
        })
    }

    fn open_video_encoder(
        &mut self,
        _muxer: &mut TestMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<TestVideoEncoder> {
        if self.fails(FailAt::OpenVideo) {
            bail!("codec not found: libx264");
        }
        self.recorder.record(Call::OpenVideo);
        let fail_send = match self.failure() {
            Some(FailAt::SendPicture(n)) => Some(n),
            _ => None,
        };
        Ok(TestVideoEncoder {
            recorder: Arc::clone(&self.recorder),
            time_base: config.video_time_base(),
            delay: self.video_delay,
            pending: VecDeque::new(),
            eof: false,
            sent: 0,
            fail_send,
        })
    }

    fn open_audio_encoder(
        &mut self,
        _muxer: &mut TestMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<TestAudioEncoder> {
        if self.fails(FailAt::OpenAudio) {
            bail!("codec not found: aac");
        }
        self.recorder.record(Call::OpenAudio);
        Ok(TestAudioEncoder {
            recorder: Arc::clone(&self.recorder),
            time_base: config.audio_time_base(),
            frame_size: self.audio_frame_size,
            channels: self.audio_channels,
            pending: VecDeque::new(),
        })
    }

    fn create_scaler(&mut self, spec: ScalerSpec) -> anyhow::Result<TestScaler> {
        self.recorder.record(Call::BuildScaler(spec));
        Ok(TestScaler { spec })
    }
}
