use bytes::Bytes;
use ffmpeg_next::{
    ChannelLayout, Codec, Dictionary, Packet, codec,
    format::{Pixel, Sample, sample},
    frame,
};

use super::{output::FlvMuxer, to_rational};
use crate::{
    codec::{AudioEncoder, VideoEncoder},
    config::{AUDIO_BIT_RATE, AUDIO_CHANNELS, StreamConfig},
    packet::{EncodedPacket, StreamKind, TimeBase},
};

const AUDIO_FORMAT: Sample = Sample::F32(sample::Type::Planar);

pub struct FfmpegVideoEncoder {
    inner: codec::encoder::Video,
    time_base: TimeBase,
}

// Encoder contexts are only used from the thread that owns the session.
unsafe impl Send for FfmpegVideoEncoder {}

impl FfmpegVideoEncoder {
    /// Opens `codec` for YUV420P at the configured size and registers the
    /// stream on `muxer`.
    pub(super) fn open(
        codec: Codec,
        muxer: &mut FlvMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<Self> {
        let time_base = config.video_time_base();
        let global_header = muxer.needs_global_header();

        let mut ost = muxer.context().add_stream(codec)?;
        let index = ost.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(to_rational(time_base));
        encoder.set_frame_rate(Some(to_rational(time_base.invert())));
        encoder.set_bit_rate(config.bitrate);
        encoder.set_gop(config.gop_size());
        encoder.set_max_b_frames(0);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", &config.preset);
        opts.set("tune", &config.tune);
        let encoder = encoder.open_with(opts)?;

        ost.set_parameters(&encoder);
        ost.set_time_base(to_rational(time_base));
        muxer.set_stream(StreamKind::Video, index);

        log::info!(
            "video encoder opened: {} {}x{}, time base {}, gop {}, {} bps",
            codec.name(),
            config.width,
            config.height,
            time_base,
            config.gop_size(),
            config.bitrate
        );
        Ok(Self {
            inner: encoder,
            time_base,
        })
    }
}

impl VideoEncoder for FfmpegVideoEncoder {
    type Picture = frame::Video;

    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn send_picture(&mut self, mut picture: frame::Video, pts: i64) -> anyhow::Result<()> {
        picture.set_pts(Some(pts));
        self.inner.send_frame(&picture)?;
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        receive_packet(&mut self.inner, self.time_base)
    }
}

pub struct FfmpegAudioEncoder {
    inner: codec::encoder::Audio,
    time_base: TimeBase,
    sample_rate: u32,
    frame_size: usize,
}

unsafe impl Send for FfmpegAudioEncoder {}

impl FfmpegAudioEncoder {
    /// Opens `codec` for planar f32 stereo and registers the stream on `muxer`.
    pub(super) fn open(
        codec: Codec,
        muxer: &mut FlvMuxer,
        config: &StreamConfig,
    ) -> anyhow::Result<Self> {
        let time_base = config.audio_time_base();
        let global_header = muxer.needs_global_header();

        let mut ost = muxer.context().add_stream(codec)?;
        let index = ost.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()?;
        encoder.set_rate(config.sample_rate as i32);
        encoder.set_channel_layout(ChannelLayout::STEREO);
        encoder.set_format(AUDIO_FORMAT);
        encoder.set_bit_rate(AUDIO_BIT_RATE);
        encoder.set_time_base(to_rational(time_base));
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open()?;

        ost.set_parameters(&encoder);
        ost.set_time_base(to_rational(time_base));
        muxer.set_stream(StreamKind::Audio, index);

        let frame_size = encoder.frame_size() as usize;
        log::info!(
            "audio encoder opened: {} {} Hz, {} samples per frame",
            codec.name(),
            config.sample_rate,
            frame_size
        );
        Ok(Self {
            inner: encoder,
            time_base,
            sample_rate: config.sample_rate,
            frame_size,
        })
    }
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn channels(&self) -> usize {
        AUDIO_CHANNELS
    }

    fn send_samples(
        &mut self,
        planes: &[Vec<f32>],
        samples: usize,
        pts: i64,
    ) -> anyhow::Result<()> {
        let mut frame = frame::Audio::new(AUDIO_FORMAT, samples, ChannelLayout::STEREO);
        frame.set_rate(self.sample_rate);
        frame.set_pts(Some(pts));
        for (index, plane) in planes.iter().enumerate().take(frame.planes()) {
            let dst = frame.data_mut(index);
            for (bytes, sample) in dst.chunks_exact_mut(4).zip(&plane[..samples]) {
                bytes.copy_from_slice(&sample.to_ne_bytes());
            }
        }
        self.inner.send_frame(&frame)?;
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        receive_packet(&mut self.inner, self.time_base)
    }
}

/// Next ready packet; `None` when the encoder wants more input or is drained.
fn receive_packet(
    encoder: &mut codec::encoder::Encoder,
    time_base: TimeBase,
) -> anyhow::Result<Option<EncodedPacket>> {
    let mut packet = Packet::empty();
    match encoder.receive_packet(&mut packet) {
        Ok(()) => {
            let data = Bytes::copy_from_slice(packet.data().unwrap_or_default());
            Ok(Some(
                EncodedPacket::new(data, packet.pts(), packet.dts(), time_base)
                    .with_key(packet.is_key())
                    .with_duration(packet.duration()),
            ))
        }
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(None)
        }
        Err(ffmpeg_next::Error::Eof) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
