//! Synthetic producers standing in for a real-time host: a moving test
//! pattern on the video side and a sine tone on the audio side.

use std::{
    f64::consts::TAU,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use ffmpeg_push::{AudioInput, PixelLayout, StreamConfig, SubmitOutcome, VideoInput};
use tokio_util::sync::CancellationToken;

/// Frames per host audio callback.
const AUDIO_BLOCK: usize = 256;
const TONE_HZ: f64 = 440.0;

pub fn spawn_video(
    input: VideoInput,
    config: &StreamConfig,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let (width, height) = (config.width, config.height);
    let interval = Duration::from_secs_f64(1.0 / config.framerate);
    std::thread::Builder::new()
        .name("video-source".to_string())
        .spawn(move || {
            let stride = width as usize * 4;
            let mut pixels = vec![0u8; stride * height as usize];
            let started = Instant::now();
            let mut index: u64 = 0;
            let mut dropped: u64 = 0;
            while !cancel.is_cancelled() {
                draw_pattern(&mut pixels, width, height, index);
                match input.submit_video_frame(&pixels, width, height, stride, PixelLayout::Argb) {
                    Ok(SubmitOutcome::Dropped) => {
                        dropped += 1;
                        if dropped % 120 == 1 {
                            log::debug!("video queue full, dropped {} frames", dropped);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("video frame rejected: {}", e),
                }
                index += 1;
                let next = started + interval.mul_f64(index as f64);
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
            log::info!("video source stopped after {} frames", index);
        })
}

/// ARGB color bars with a white bar sweeping left to right.
fn draw_pattern(pixels: &mut [u8], width: u32, height: u32, index: u64) {
    const BARS: [[u8; 3]; 7] = [
        [192, 192, 192],
        [192, 192, 0],
        [0, 192, 192],
        [0, 192, 0],
        [192, 0, 192],
        [192, 0, 0],
        [0, 0, 192],
    ];
    let width = width as usize;
    let sweep = (index as usize * 8) % width;
    for row in pixels.chunks_exact_mut(width * 4).take(height as usize) {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let rgb = if x.abs_diff(sweep) < 8 {
                [255, 255, 255]
            } else {
                BARS[x * BARS.len() / width]
            };
            px[0] = 255;
            px[1..].copy_from_slice(&rgb);
        }
    }
}

pub fn spawn_audio(
    mut input: AudioInput,
    sample_rate: u32,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let block = Duration::from_secs_f64(AUDIO_BLOCK as f64 / sample_rate as f64);
    std::thread::Builder::new()
        .name("audio-source".to_string())
        .spawn(move || {
            let mut left = [0.0f64; AUDIO_BLOCK];
            let mut right = [0.0f64; AUDIO_BLOCK];
            let step = TAU * TONE_HZ / sample_rate as f64;
            let mut phase = 0.0f64;
            let started = Instant::now();
            let mut blocks: u64 = 0;
            while !cancel.is_cancelled() {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let sample = phase.sin() * 0.25;
                    *l = sample;
                    *r = sample;
                    phase = (phase + step) % TAU;
                }
                input.submit_planar(&left, &right);
                blocks += 1;
                let next = started + block.mul_f64(blocks as f64);
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
            log::info!("audio source stopped after {} blocks", blocks);
        })
}
