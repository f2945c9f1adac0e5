//! Capability seams between the session and the media library.
//!
//! A [`MediaBackend`] builds the muxer, both encoders and the scaler for one
//! session. The session only ever talks to these traits, so the FFmpeg
//! binding and test doubles are interchangeable.

use crate::{
    config::StreamConfig,
    frame::{PixelLayout, VideoFrame},
    packet::{EncodedPacket, StreamKind, TimeBase},
};

/// Source/target geometry a scaler is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalerSpec {
    pub src_width: u32,
    pub src_height: u32,
    pub layout: PixelLayout,
    pub dst_width: u32,
    pub dst_height: u32,
}

/// Pixel format conversion plus resize into the encoder's raster.
pub trait FrameScaler: Send {
    type Picture;

    fn scale(&mut self, frame: &VideoFrame) -> anyhow::Result<Self::Picture>;
}

pub trait VideoEncoder: Send {
    type Picture;

    fn time_base(&self) -> TimeBase;

    fn send_picture(&mut self, picture: Self::Picture, pts: i64) -> anyhow::Result<()>;

    /// Signals end of stream so buffered pictures get flushed.
    fn send_eof(&mut self) -> anyhow::Result<()>;

    /// Next ready packet, `Ok(None)` when the encoder needs more input.
    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>>;
}

pub trait AudioEncoder: Send {
    fn time_base(&self) -> TimeBase;

    /// Samples per channel the codec requires per submitted frame; 0 when
    /// the codec accepts any size.
    fn frame_size(&self) -> usize;

    fn channels(&self) -> usize;

    /// Submits one frame given as one plane per channel.
    fn send_samples(&mut self, planes: &[Vec<f32>], samples: usize, pts: i64)
    -> anyhow::Result<()>;

    fn send_eof(&mut self) -> anyhow::Result<()>;

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>>;
}

/// Container writer bound to one output sink.
pub trait Muxer: Send {
    fn write_header(&mut self) -> anyhow::Result<()>;

    /// Time base of the output stream, valid once the header is written.
    fn stream_time_base(&self, kind: StreamKind) -> TimeBase;

    /// Writes a packet already expressed in `stream_time_base(kind)`.
    fn write_packet(&mut self, kind: StreamKind, packet: EncodedPacket) -> anyhow::Result<()>;

    fn write_trailer(&mut self) -> anyhow::Result<()>;
}

pub trait MediaBackend: Send + 'static {
    type Picture: Send;
    type Scaler: FrameScaler<Picture = Self::Picture> + 'static;
    type Video: VideoEncoder<Picture = Self::Picture> + 'static;
    type Audio: AudioEncoder + 'static;
    type Muxer: Muxer + 'static;

    /// Allocates the container and opens the sink.
    fn open_muxer(&mut self, config: &StreamConfig) -> anyhow::Result<Self::Muxer>;

    /// Opens the video encoder and registers its stream on `muxer`.
    fn open_video_encoder(
        &mut self,
        muxer: &mut Self::Muxer,
        config: &StreamConfig,
    ) -> anyhow::Result<Self::Video>;

    /// Opens the audio encoder and registers its stream on `muxer`.
    fn open_audio_encoder(
        &mut self,
        muxer: &mut Self::Muxer,
        config: &StreamConfig,
    ) -> anyhow::Result<Self::Audio>;

    fn create_scaler(&mut self, spec: ScalerSpec) -> anyhow::Result<Self::Scaler>;
}
