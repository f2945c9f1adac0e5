use ffmpeg_next::{
    format::Pixel,
    frame,
    software::scaling::{self, flag::Flags},
};

use crate::{
    codec::{FrameScaler, ScalerSpec},
    frame::{PixelLayout, VideoFrame},
};

/// Converts host frames into YUV420P at the encoder size.
pub struct FfmpegScaler {
    context: scaling::Context,
    spec: ScalerSpec,
    /// Staging copy of the host frame in FFmpeg's own line layout.
    source: frame::Video,
}

unsafe impl Send for FfmpegScaler {}

fn pixel_format(layout: PixelLayout) -> Pixel {
    match layout {
        PixelLayout::Argb => Pixel::ARGB,
        PixelLayout::Bgra => Pixel::BGRA,
        PixelLayout::Rgba => Pixel::RGBA,
    }
}

impl FfmpegScaler {
    pub fn new(spec: ScalerSpec) -> anyhow::Result<Self> {
        let format = pixel_format(spec.layout);
        let context = scaling::Context::get(
            format,
            spec.src_width,
            spec.src_height,
            Pixel::YUV420P,
            spec.dst_width,
            spec.dst_height,
            Flags::BILINEAR,
        )?;
        Ok(Self {
            context,
            spec,
            source: frame::Video::new(format, spec.src_width, spec.src_height),
        })
    }
}

impl FrameScaler for FfmpegScaler {
    type Picture = frame::Video;

    fn scale(&mut self, input: &VideoFrame) -> anyhow::Result<frame::Video> {
        if input.width() != self.spec.src_width || input.height() != self.spec.src_height {
            anyhow::bail!(
                "frame {}x{} does not match scaler input {}x{}",
                input.width(),
                input.height(),
                self.spec.src_width,
                self.spec.src_height
            );
        }

        let stride = self.source.stride(0);
        let data = self.source.data_mut(0);
        for row in 0..input.height() as usize {
            let src = input.row(row);
            data[row * stride..row * stride + src.len()].copy_from_slice(src);
        }

        let mut converted = frame::Video::new(
            Pixel::YUV420P,
            self.spec.dst_width,
            self.spec.dst_height,
        );
        self.context.run(&self.source, &mut converted)?;
        Ok(converted)
    }
}
