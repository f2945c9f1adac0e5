use std::sync::LazyLock;

use anyhow::Context;
use ffmpeg_push::{PipelineOptions, StreamConfig};
use serde::Deserialize;

/// JSON file with an `AppConfig`; every field is optional.
const CONFIG_ENV: &str = "LIVE_PUSH_CONFIG";
/// Overrides `stream.url`.
const URL_ENV: &str = "LIVE_PUSH_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub pipeline: PipelineOptions,
}

impl AppConfig {
    fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("read config file {}", path))?;
                serde_json::from_str::<AppConfig>(&text)
                    .with_context(|| format!("parse config file {}", path))?
            }
            Err(_) => AppConfig::default(),
        };
        if let Ok(url) = std::env::var(URL_ENV) {
            config.stream.url = url;
        }
        config.stream.validate()?;
        Ok(config)
    }
}

pub fn config() -> &'static AppConfig {
    static CONFIG: LazyLock<AppConfig> = LazyLock::new(|| {
        AppConfig::load().unwrap_or_else(|e| {
            eprintln!("Error loading config: {:#}", e);
            std::process::exit(1);
        })
    });
    &CONFIG
}
