//! Live video + audio push pipeline: real-time producers feed a lock-free
//! audio ring and a bounded video queue, one worker encodes H.264/AAC and
//! muxes into FLV over RTMP (or any sink the muxer accepts).

/// Registers FFmpeg components and network protocols. Call once at startup
/// before the first `start`.
#[cfg(feature = "ffmpeg")]
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::format::network::init();
    Ok(())
}

pub mod audio_ring;
pub mod codec;
pub mod config;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod frame_queue;
pub mod packet;
pub mod session;
pub mod stats;
pub mod streamer;
mod worker;

#[cfg(test)]
mod test_backend;

pub use config::{PipelineOptions, StreamConfig};
pub use error::{Result, StreamError};
pub use frame::{PixelLayout, VideoFrame};
pub use frame_queue::DropPolicy;
pub use stats::{SessionState, StreamStats};
pub use streamer::{AudioInput, Streamer, SubmitOutcome, VideoInput};
