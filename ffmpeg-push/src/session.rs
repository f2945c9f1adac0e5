use anyhow::anyhow;

use crate::{
    codec::{AudioEncoder, FrameScaler, MediaBackend, Muxer, ScalerSpec, VideoEncoder},
    config::StreamConfig,
    error::{Result, StreamError},
    frame::{PixelLayout, VideoFrame},
    packet::{EncodedPacket, StreamKind},
};

/// Used when the audio codec reports a variable frame size.
pub const DEFAULT_AUDIO_FRAME_SIZE: usize = 1024;

struct CachedScaler<S> {
    key: (u32, u32, PixelLayout),
    scaler: S,
}

/// Packets and bytes handed to the muxer by one encode call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Written {
    pub packets: u64,
    pub bytes: u64,
}

impl std::ops::AddAssign for Written {
    fn add_assign(&mut self, rhs: Self) {
        self.packets += rhs.packets;
        self.bytes += rhs.bytes;
    }
}

/// Encoder and muxer state of one connection.
///
/// Built by [`StreamSession::connect`], owned by the encode worker while
/// streaming and released by [`StreamSession::disconnect`]. A session is
/// never reused: every reconnect builds a new one.
pub struct StreamSession<B: MediaBackend> {
    backend: B,
    config: StreamConfig,
    muxer: Option<B::Muxer>,
    video: Option<B::Video>,
    audio: Option<B::Audio>,
    scaler: Option<CachedScaler<B::Scaler>>,
    header_written: bool,
    video_pts: i64,
    audio_pts: i64,
    audio_frame_size: usize,
    planes: Vec<Vec<f32>>,
}

impl<B: MediaBackend> StreamSession<B> {
    /// Opens the sink, both encoders and writes the container header.
    /// Whatever was allocated before a failing step is released on return.
    pub fn connect(mut backend: B, config: StreamConfig) -> Result<Self> {
        let mut muxer = backend
            .open_muxer(&config)
            .map_err(|e| StreamError::Connect(e.context(format!("open output {}", config.url))))?;
        let video = backend
            .open_video_encoder(&mut muxer, &config)
            .map_err(|e| StreamError::Connect(e.context("open video encoder")))?;
        let audio = backend
            .open_audio_encoder(&mut muxer, &config)
            .map_err(|e| StreamError::Connect(e.context("open audio encoder")))?;
        if audio.channels() == 0 {
            return Err(StreamError::Connect(anyhow!(
                "audio encoder reports no channels"
            )));
        }
        muxer
            .write_header()
            .map_err(|e| StreamError::Connect(e.context("write header")))?;

        let audio_frame_size = match audio.frame_size() {
            0 => DEFAULT_AUDIO_FRAME_SIZE,
            n => n,
        };
        let planes = vec![vec![0.0; audio_frame_size]; audio.channels()];

        log::info!(
            "session connected: {} {}x{} @ {} fps, video time base {}, audio {} Hz, {} samples per frame",
            config.url,
            config.width,
            config.height,
            config.framerate,
            video.time_base(),
            config.sample_rate,
            audio_frame_size
        );

        Ok(Self {
            backend,
            config,
            muxer: Some(muxer),
            video: Some(video),
            audio: Some(audio),
            scaler: None,
            header_written: true,
            video_pts: 0,
            audio_pts: 0,
            audio_frame_size,
            planes,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.muxer.is_some()
    }

    /// Samples per channel of every chunk handed to `encode_audio_chunk`.
    pub fn audio_frame_size(&self) -> usize {
        self.audio_frame_size
    }

    pub fn audio_channels(&self) -> usize {
        self.planes.len()
    }

    /// Pts the next video frame will get.
    pub fn video_pts(&self) -> i64 {
        self.video_pts
    }

    /// Pts the next audio chunk will get, in samples per channel.
    pub fn audio_pts(&self) -> i64 {
        self.audio_pts
    }

    pub fn encode_video_frame(&mut self, frame: &VideoFrame) -> Result<Written> {
        let (Some(video), Some(muxer)) = (self.video.as_mut(), self.muxer.as_mut()) else {
            return Err(StreamError::Encode(anyhow!("session is disconnected")));
        };

        let key = (frame.width(), frame.height(), frame.layout());
        if self.scaler.as_ref().is_none_or(|cached| cached.key != key) {
            log::debug!(
                "building scaler {}x{} {:?} -> {}x{}",
                key.0,
                key.1,
                key.2,
                self.config.width,
                self.config.height
            );
            let scaler = self
                .backend
                .create_scaler(ScalerSpec {
                    src_width: key.0,
                    src_height: key.1,
                    layout: key.2,
                    dst_width: self.config.width,
                    dst_height: self.config.height,
                })
                .map_err(StreamError::Encode)?;
            self.scaler = Some(CachedScaler { key, scaler });
        }
        let cached = self
            .scaler
            .as_mut()
            .ok_or_else(|| StreamError::Encode(anyhow!("scaler unavailable")))?;

        let picture = cached.scaler.scale(frame).map_err(StreamError::Encode)?;
        let pts = self.video_pts;
        self.video_pts += 1;
        video
            .send_picture(picture, pts)
            .map_err(StreamError::Encode)?;

        drain_packets(muxer, StreamKind::Video, || video.receive_packet())
    }

    /// Encodes one chunk of interleaved samples. The chunk must hold exactly
    /// `frame_size` samples per channel, and `frame_size` must be the codec's.
    pub fn encode_audio_chunk(&mut self, samples: &[f32], frame_size: usize) -> Result<Written> {
        let (Some(audio), Some(muxer)) = (self.audio.as_mut(), self.muxer.as_mut()) else {
            return Err(StreamError::Encode(anyhow!("session is disconnected")));
        };
        if frame_size != self.audio_frame_size {
            return Err(StreamError::Encode(anyhow!(
                "audio chunk of {} samples per channel, encoder needs {}",
                frame_size,
                self.audio_frame_size
            )));
        }
        let channels = self.planes.len();
        if samples.len() != frame_size * channels {
            return Err(StreamError::Encode(anyhow!(
                "audio chunk holds {} samples, expected {}",
                samples.len(),
                frame_size * channels
            )));
        }

        for (i, interleaved) in samples.chunks_exact(channels).enumerate() {
            for (plane, sample) in self.planes.iter_mut().zip(interleaved) {
                plane[i] = *sample;
            }
        }

        let pts = self.audio_pts;
        self.audio_pts += frame_size as i64;
        audio
            .send_samples(&self.planes, frame_size, pts)
            .map_err(StreamError::Encode)?;

        drain_packets(muxer, StreamKind::Audio, || audio.receive_packet())
    }

    /// Flushes both encoders, writes the trailer and closes the sink.
    /// Safe to call any number of times; failures are logged, not returned.
    pub fn disconnect(&mut self) {
        let Some(mut muxer) = self.muxer.take() else {
            return;
        };

        if let Some(mut video) = self.video.take() {
            if let Err(e) = video.send_eof() {
                log::warn!("video encoder flush error: {:#}", e);
            } else if let Err(e) = drain_packets(&mut muxer, StreamKind::Video, || {
                video.receive_packet()
            }) {
                log::warn!("video drain on disconnect error: {:#}", e);
            }
        }
        if let Some(mut audio) = self.audio.take() {
            if let Err(e) = audio.send_eof() {
                log::warn!("audio encoder flush error: {:#}", e);
            } else if let Err(e) = drain_packets(&mut muxer, StreamKind::Audio, || {
                audio.receive_packet()
            }) {
                log::warn!("audio drain on disconnect error: {:#}", e);
            }
        }

        if self.header_written {
            self.header_written = false;
            if let Err(e) = muxer.write_trailer() {
                log::warn!("write trailer error: {:#}", e);
            }
        }
        self.scaler = None;
        drop(muxer);

        log::info!(
            "session disconnected: {}, {} video frames, {} audio samples",
            self.config.url,
            self.video_pts,
            self.audio_pts
        );
    }
}

impl<B: MediaBackend> Drop for StreamSession<B> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Pulls every ready packet out of an encoder, moves it into the output
/// stream's time base and writes it, in the order the encoder produced them.
fn drain_packets<M: Muxer>(
    muxer: &mut M,
    kind: StreamKind,
    mut receive: impl FnMut() -> anyhow::Result<Option<EncodedPacket>>,
) -> Result<Written> {
    let mut written = Written::default();
    while let Some(mut packet) = receive().map_err(StreamError::Encode)? {
        packet.rescale_ts(muxer.stream_time_base(kind));
        let bytes = packet.size() as u64;
        muxer
            .write_packet(kind, packet)
            .map_err(StreamError::Write)?;
        written.packets += 1;
        written.bytes += bytes;
    }
    Ok(written)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
