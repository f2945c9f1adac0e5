use anyhow::anyhow;
use ffmpeg_next::{Packet, codec, format};

use super::from_rational;
use crate::{
    codec::Muxer,
    packet::{EncodedPacket, StreamKind, TimeBase},
};

/// Used before the header fixes the real stream time base.
const FALLBACK_TIME_BASE: TimeBase = TimeBase::new(1, 1000);

pub struct FlvMuxer {
    inner: format::context::Output,
    url: String,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    have_written_header: bool,
    have_written_trailer: bool,
}

// The output context is only ever driven by the thread that owns the session.
unsafe impl Send for FlvMuxer {}

impl FlvMuxer {
    /// Allocates the `format` container and opens `url` for writing.
    pub fn open(url: &str, format: &str) -> anyhow::Result<Self> {
        let inner = format::output_as(url, format)
            .map_err(|e| anyhow!("open {} as {}: {}", url, format, e))?;
        log::info!("output opened: {} ({})", url, format);
        Ok(Self {
            inner,
            url: url.to_string(),
            video_index: None,
            audio_index: None,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    pub(super) fn context(&mut self) -> &mut format::context::Output {
        &mut self.inner
    }

    pub(super) fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER)
    }

    pub(super) fn set_stream(&mut self, kind: StreamKind, index: usize) {
        match kind {
            StreamKind::Video => self.video_index = Some(index),
            StreamKind::Audio => self.audio_index = Some(index),
        }
    }

    fn stream_index(&self, kind: StreamKind) -> Option<usize> {
        match kind {
            StreamKind::Video => self.video_index,
            StreamKind::Audio => self.audio_index,
        }
    }
}

impl Muxer for FlvMuxer {
    fn write_header(&mut self) -> anyhow::Result<()> {
        if !self.have_written_header {
            self.inner.write_header()?;
            self.have_written_header = true;
            log::info!(
                "header written: {}, {} streams",
                self.url,
                self.inner.nb_streams()
            );
        }
        Ok(())
    }

    fn stream_time_base(&self, kind: StreamKind) -> TimeBase {
        self.stream_index(kind)
            .and_then(|index| self.inner.stream(index))
            .map(|stream| from_rational(stream.time_base()))
            .unwrap_or(FALLBACK_TIME_BASE)
    }

    fn write_packet(&mut self, kind: StreamKind, packet: EncodedPacket) -> anyhow::Result<()> {
        let index = self
            .stream_index(kind)
            .ok_or_else(|| anyhow!("{:?} stream not found", kind))?;

        let mut p = Packet::copy(packet.data());
        p.set_stream(index);
        p.set_pts(packet.pts());
        p.set_dts(packet.dts());
        p.set_duration(packet.duration());
        p.set_position(-1);
        if packet.is_key() {
            p.set_flags(codec::packet::Flags::KEY);
        }
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}
