use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use ffmpeg_push::{SessionState, Streamer, ffmpeg::FfmpegBackend};
use tokio_util::sync::CancellationToken;

mod config;
mod source;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_push", log::LevelFilter::Debug)
        .filter_module("live_push", log::LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    ffmpeg_push::init()?;
    let config = config::config();

    let streamer = Arc::new(Streamer::new(FfmpegBackend, config.pipeline.clone()));
    let audio = streamer
        .audio_input()
        .ok_or_else(|| anyhow!("audio input already taken"))?;

    let cancel = CancellationToken::new();
    let video_source = source::spawn_video(streamer.video_input(), &config.stream, cancel.clone())?;
    let audio_source = source::spawn_audio(audio, config.stream.sample_rate, cancel.clone())?;

    let s = Arc::clone(&streamer);
    let stream_config = config.stream.clone();
    tokio::task::spawn_blocking(move || s.start(stream_config)).await??;

    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    loop {
        tokio::select! {
            _ = stats_tick.tick() => {
                let stats = streamer.stats();
                log::info!("stats: {}", serde_json::to_string(&stats)?);
                if stats.state == SessionState::Failed {
                    log::error!("stream failed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                break;
            },
        }
    }

    cancel.cancel();
    let s = Arc::clone(&streamer);
    tokio::task::spawn_blocking(move || s.stop()).await?;
    for handle in [video_source, audio_source] {
        handle
            .join()
            .map_err(|_| anyhow!("source thread panicked"))?;
    }
    Ok(())
}
