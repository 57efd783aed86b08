//! HTTP TTS engines speaking the OpenAI `/audio/speech` protocol
//!
//! Both engines request raw 16-bit PCM at 24 kHz so responses decode without
//! a container parser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::audio_timeline::AudioClip;
use crate::text_chunker::ChunkPolicy;
use crate::tts_engine::{Synthesis, TtsEngine, TtsError};

/// Sample rate of `response_format: "pcm"` responses
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Voices offered by the OpenAI speech endpoint
pub const OPENAI_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Kokoro voices that are listed but not used
const KOKORO_EXCLUDED_VOICES: [&str; 1] = ["af_nicole"];

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
}

fn build_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// POST a speech request and decode the PCM body
async fn request_speech(
    client: &HttpClient,
    api_url: &str,
    api_key: Option<&str>,
    request: &SpeechRequest<'_>,
) -> Result<AudioClip, TtsError> {
    if request.input.trim().is_empty() {
        return Err(TtsError::EmptyText);
    }

    let url = format!("{}/audio/speech", api_url.trim_end_matches('/'));
    let mut builder = client.post(&url).json(request);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        builder = builder.bearer_auth(key);
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TtsError::Engine(format!("{} returned {}: {}", url, status, body.trim())));
    }

    let bytes = response.bytes().await?;
    Ok(AudioClip::from_pcm16_le(&bytes, PCM_SAMPLE_RATE))
}

// ============================================================================
// OPENAI TTS ENGINE
// ============================================================================

/// OpenAI speech endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiTtsConfig {
    #[serde(default = "default_openai_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiTtsConfig {
    fn default() -> Self {
        Self {
            api_url: default_openai_url(),
            api_key: String::new(),
            model: default_speech_model(),
            speed: default_speed(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_kokoro_url() -> String {
    "http://localhost:8880/v1".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_timeout_secs() -> u64 {
    120
}

pub struct OpenAiTtsEngine {
    config: OpenAiTtsConfig,
    client: HttpClient,
}

impl OpenAiTtsEngine {
    pub fn new(config: OpenAiTtsConfig) -> Self {
        let client = build_client(Duration::from_secs(config.timeout_secs));
        Self { config, client }
    }
}

#[async_trait]
impl TtsEngine for OpenAiTtsEngine {
    fn engine_name(&self) -> &str {
        "openai"
    }

    async fn list_available_voices(&self) -> Result<Vec<String>, TtsError> {
        Ok(OPENAI_VOICES.iter().map(|v| v.to_string()).collect())
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Synthesis, TtsError> {
        if !OPENAI_VOICES.contains(&voice_id) {
            return Err(TtsError::InvalidVoice(voice_id.to_string()));
        }

        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: voice_id,
            response_format: "pcm",
            speed: self.config.speed,
        };
        let clip = request_speech(&self.client, &self.config.api_url, Some(&self.config.api_key), &request).await?;

        ::log::debug!("OpenAI TTS: {} chars -> {} ms", text.len(), clip.duration_ms());
        Ok(Synthesis { clip, subtitle: None })
    }

    fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::chars(4000)
    }
}

// ============================================================================
// KOKORO TTS ENGINE
// ============================================================================

/// Kokoro-FastAPI server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KokoroTtsConfig {
    #[serde(default = "default_kokoro_url")]
    pub api_url: String,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KokoroTtsConfig {
    fn default() -> Self {
        Self {
            api_url: default_kokoro_url(),
            model: default_speech_model(),
            speed: default_speed(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct KokoroTtsEngine {
    config: KokoroTtsConfig,
    client: HttpClient,
}

impl KokoroTtsEngine {
    pub fn new(config: KokoroTtsConfig) -> Self {
        let client = build_client(Duration::from_secs(config.timeout_secs));
        Self { config, client }
    }

    /// Keep American English voices, minus the excluded ones
    fn filter_voices(voices: Vec<String>) -> Vec<String> {
        voices
            .into_iter()
            .filter(|v| v.starts_with("af") || v.starts_with("am"))
            .filter(|v| !KOKORO_EXCLUDED_VOICES.contains(&v.as_str()))
            .collect()
    }
}

#[async_trait]
impl TtsEngine for KokoroTtsEngine {
    fn engine_name(&self) -> &str {
        "kokoro"
    }

    async fn list_available_voices(&self) -> Result<Vec<String>, TtsError> {
        let url = format!("{}/audio/voices", self.config.api_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TtsError::Engine(format!("{} returned {}", url, response.status())));
        }

        // Either a bare list or {"voices": [...]}
        let body: serde_json::Value = response.json().await?;
        let list = body.get("voices").unwrap_or(&body);
        let voices: Vec<String> = list
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::filter_voices(voices))
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Synthesis, TtsError> {
        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: voice_id,
            response_format: "pcm",
            speed: self.config.speed,
        };
        let clip = request_speech(&self.client, &self.config.api_url, None, &request).await?;

        ::log::debug!("Kokoro TTS: {} chars with {} -> {} ms", text.len(), voice_id, clip.duration_ms());
        Ok(Synthesis { clip, subtitle: None })
    }

    fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::chars(1000)
    }
}

// ============================================================================
// TESTS
// ============================================================================
