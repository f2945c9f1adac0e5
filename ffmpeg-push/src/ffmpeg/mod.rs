//! FFmpeg implementation of the codec and muxer capabilities: libx264 (or
//! any H.264 encoder), the native AAC encoder and libavformat output.

mod encoder;
mod output;
mod scaler;

use anyhow::anyhow;
use ffmpeg_next::{Rational, codec, frame};

use crate::{
    codec::{MediaBackend, ScalerSpec},
    config::StreamConfig,
    packet::TimeBase,
};

pub use encoder::{FfmpegAudioEncoder, FfmpegVideoEncoder};
pub use output::FlvMuxer;
pub use scaler::FfmpegScaler;

/// Preferred H.264 implementation; any registered H.264 encoder is the fallback.
const VIDEO_CODEC: &str = "libx264";

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    type Picture = frame::Video;
    type Scaler = FfmpegScaler;
    type Video = FfmpegVideoEncoder;
    type Audio = FfmpegAudioEncoder;
    type Muxer = FlvMuxer;

    fn open_muxer(&mut self, config: &StreamConfig) -> anyhow::Result<FlvMuxer> {
        FlvMuxer::open(&config.url, &config.format)
    }

    fn open_video_encoder(
        &mut self,
        muxer: &mut FlvMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<FfmpegVideoEncoder> {
        let codec = ffmpeg_next::encoder::find_by_name(VIDEO_CODEC)
            .or_else(|| {
                log::warn!("{} not available, using default H.264 encoder", VIDEO_CODEC);
                ffmpeg_next::encoder::find(codec::Id::H264)
            })
            .ok_or_else(|| anyhow!("codec not found: h264"))?;
        FfmpegVideoEncoder::open(codec, muxer, config)
    }

    fn open_audio_encoder(
        &mut self,
        muxer: &mut FlvMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<FfmpegAudioEncoder> {
        let codec = ffmpeg_next::encoder::find(codec::Id::AAC)
            .ok_or_else(|| anyhow!("codec not found: aac"))?;
        FfmpegAudioEncoder::open(codec, muxer, config)
    }

    fn create_scaler(&mut self, spec: ScalerSpec) -> anyhow::Result<FfmpegScaler> {
        FfmpegScaler::new(spec)
    }
}

fn to_rational(time_base: TimeBase) -> Rational {
    Rational::new(time_base.num, time_base.den)
}

fn from_rational(rational: Rational) -> TimeBase {
    TimeBase::new(rational.numerator(), rational.denominator())
}
