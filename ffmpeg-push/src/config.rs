use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    audio_ring::DEFAULT_CAPACITY, error::StreamError, frame_queue::DropPolicy, packet::TimeBase,
};

/// Fixed AAC bitrate.
pub const AUDIO_BIT_RATE: usize = 128_000;
/// Interleaved stereo throughout the pipeline.
pub const AUDIO_CHANNELS: usize = 2;
/// Accepted framerate range, in frames per second.
pub const MIN_FRAMERATE: f64 = 0.001;
pub const MAX_FRAMERATE: f64 = 1000.0;

/// Stream parameters. Set before `start`, immutable for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Destination, e.g. `rtmp://host/app/key` or a file path.
    pub url: String,
    /// Container format handed to the muxer.
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    /// Video bitrate in bits per second, passed to the encoder unchanged.
    pub bitrate: usize,
    pub sample_rate: u32,
    pub preset: String,
    pub tune: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "rtmp://localhost/live/stream".to_string(),
            format: "flv".to_string(),
            width: 1280,
            height: 720,
            framerate: 30.0,
            bitrate: 2_500_000,
            sample_rate: 44_100,
            preset: "veryfast".to_string(),
            tune: "zerolatency".to_string(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.url.trim().is_empty() {
            return Err(StreamError::InvalidConfig("url is empty".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "invalid output size {}x{}",
                self.width, self.height
            )));
        }
        // YUV420P needs even dimensions.
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(StreamError::InvalidConfig(format!(
                "output size {}x{} must be even",
                self.width, self.height
            )));
        }
        if !(MIN_FRAMERATE..=MAX_FRAMERATE).contains(&self.framerate) {
            return Err(StreamError::InvalidConfig(format!(
                "framerate {} outside {}..={}",
                self.framerate, MIN_FRAMERATE, MAX_FRAMERATE
            )));
        }
        let time_base = self.video_time_base();
        if time_base.num <= 0 || time_base.den <= 0 {
            return Err(StreamError::InvalidConfig(format!(
                "framerate {} has no usable time base ({})",
                self.framerate, time_base
            )));
        }
        if self.bitrate == 0 {
            return Err(StreamError::InvalidConfig("bitrate is zero".into()));
        }
        if self.sample_rate == 0 || self.sample_rate > i32::MAX as u32 {
            return Err(StreamError::InvalidConfig(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Encoder time base for video: one tick per frame.
    pub fn video_time_base(&self) -> TimeBase {
        TimeBase::from_fps(self.framerate)
    }

    pub fn audio_time_base(&self) -> TimeBase {
        TimeBase::from_sample_rate(self.sample_rate)
    }

    /// Keyframe interval: at least one keyframe every two seconds.
    pub fn gop_size(&self) -> u32 {
        ((self.framerate * 2.0).round() as u32).max(1)
    }
}

/// Backpressure and polling knobs. Fixed for the lifetime of a `Streamer`,
/// since the queues outlive individual sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Max queued video frames.
    pub video_capacity: usize,
    pub drop_policy: DropPolicy,
    /// Audio ring size in interleaved samples.
    pub audio_capacity: usize,
    /// Worker sleep between cycles, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            video_capacity: 30,
            drop_policy: DropPolicy::RejectNewest,
            audio_capacity: DEFAULT_CAPACITY,
            poll_interval_ms: 1,
        }
    }
}

impl PipelineOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
