//! Layered settings: defaults, then `readcast.toml`, then `READCAST_*` env vars

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use readcast_cast::{ExportFormat, KokoroTtsConfig, MixerConfig, Mp3Bitrate, OpenAiTtsConfig, DEFAULT_SAMPLE_RATE};
use readcast_queue::{FeedSchedule, LlmConfig, ProcessorConfig};

const DEFAULT_CONFIG_FILE: &str = "readcast.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Holds tasks.json, history.json and sources.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Parent of the per-run clip folders
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_engine")]
    pub default_engine: String,
    /// Narration voice per engine name
    #[serde(default)]
    pub voices: HashMap<String, String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub openai: OpenAiTtsConfig,
    #[serde(default)]
    pub kokoro: KokoroTtsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub feeds: FeedSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_export_format")]
    pub format: ExportFormat,
    #[serde(default = "default_mp3_bitrate")]
    pub mp3_bitrate: u32,
    /// Target RMS level in dBFS
    #[serde(default)]
    pub normalize_db: Option<f32>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: default_export_format(),
            mp3_bitrate: default_mp3_bitrate(),
            normalize_db: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fetch every N minutes instead of at the fixed daily times
    #[serde(default)]
    pub interval_minutes: Option<u64>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("readcast"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("Output")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("readcast")
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_engine() -> String {
    "kokoro".to_string()
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_export_format() -> ExportFormat {
    ExportFormat::Mp3
}

fn default_mp3_bitrate() -> u32 {
    192
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load from `path`, or `readcast.toml` in the working directory
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            ::log::debug!("No config file at {}, using defaults", path.display());
        }

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("READCAST_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        let mut settings: Settings = figment.extract()?;
        settings.resolve_env_values();
        Ok(settings)
    }

    /// Replace `env:VAR` values with the variable's content
    fn resolve_env_values(&mut self) {
        self.openai.api_key = get_env_or_value(&self.openai.api_key);
        self.openai.api_url = get_env_or_value(&self.openai.api_url);
        self.kokoro.api_url = get_env_or_value(&self.kokoro.api_url);
        self.llm.api_key = get_env_or_value(&self.llm.api_key);
        self.llm.api_url = get_env_or_value(&self.llm.api_url);
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn sources_path(&self) -> PathBuf {
        self.data_dir.join("sources.json")
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            default_voices: self.voices.clone(),
            mixer: MixerConfig {
                export_format: self.export.format,
                mp3_bitrate: Mp3Bitrate::from_kbps(self.export.mp3_bitrate),
                normalize_db: self.export.normalize_db,
                ..Default::default()
            },
        }
    }

    pub fn feed_schedule(&self) -> FeedSchedule {
        FeedSchedule::from_interval_minutes(self.feeds.interval_minutes)
    }
}

/// `env:NAME` reads the environment variable NAME; anything else is literal
pub fn get_env_or_value(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).unwrap_or_else(|_| {
            ::log::warn!("Environment variable {} not found", var);
            String::new()
        }),
        None => value.to_string(),
    }
}
