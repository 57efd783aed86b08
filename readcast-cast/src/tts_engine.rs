//! TTS Engines - Pluggable speech synthesis backends
//!
//! This module provides:
//! - The capability trait every backend implements
//! - An explicit load/unload lifecycle owned by each engine instance
//! - A registry built once at startup and shared by reference
//! - A deterministic mock engine for tests and dry runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio_timeline::AudioClip;
use crate::subtitles::{Cue, Subtitle};
use crate::text_chunker::ChunkPolicy;

// ============================================================================
// DATA MODELS
// ============================================================================

/// Audio for one synthesis call, with optional caption timing
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub clip: AudioClip,
    pub subtitle: Option<Subtitle>,
}

/// Errors raised by TTS backends
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Text is empty")]
    EmptyText,

    #[error("Invalid voice: {0}")]
    InvalidVoice(String),

    #[error("TTS engine error: {0}")]
    Engine(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// TRAIT DEFINITIONS
// ============================================================================

/// Speech synthesis capability
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Get engine name
    fn engine_name(&self) -> &str;

    /// Voices this engine can speak with
    async fn list_available_voices(&self) -> Result<Vec<String>, TtsError>;

    /// Synthesize `text` with `voice_id`
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Synthesis, TtsError>;

    /// Largest input accepted per `synthesize` call
    fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::default()
    }

    /// Acquire models or connections before a batch of work
    async fn load(&self) -> Result<(), TtsError> {
        Ok(())
    }

    /// Release whatever `load` acquired
    async fn unload(&self) -> Result<(), TtsError> {
        Ok(())
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Named engine instances, with a default for unknown names
pub struct TtsRegistry {
    engines: HashMap<String, Arc<dyn TtsEngine>>,
    default_engine: String,
}

impl TtsRegistry {
    pub fn new(default_engine: impl Into<String>) -> Self {
        Self {
            engines: HashMap::new(),
            default_engine: default_engine.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, engine: Arc<dyn TtsEngine>) {
        self.engines.insert(name.into(), engine);
    }

    pub fn with_engine(mut self, name: impl Into<String>, engine: Arc<dyn TtsEngine>) -> Self {
        self.register(name, engine);
        self
    }

    /// Engine registered under exactly `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn TtsEngine>> {
        self.engines.get(name).cloned()
    }

    /// Engine for `name`, falling back to the default engine
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn TtsEngine>> {
        if let Some(engine) = self.get(name) {
            return Some(engine);
        }
        ::log::warn!(
            "Unknown TTS engine '{}', using default '{}'",
            name,
            self.default_engine
        );
        self.get(&self.default_engine)
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// MOCK TTS ENGINE (for testing)
// ============================================================================

/// Mock TTS engine producing a decaying sine tone per word
pub struct MockTtsEngine {
    voices: Vec<String>,
    sample_rate: u32,
    ms_per_word: u64,
    fail_marker: Option<String>,
    with_subtitles: bool,
    synth_calls: AtomicUsize,
    load_calls: AtomicUsize,
    loaded: AtomicBool,
}

impl MockTtsEngine {
    pub fn new() -> Self {
        Self {
            voices: vec!["mock_alto".to_string(), "mock_bass".to_string(), "mock_tenor".to_string()],
            sample_rate: 24_000,
            ms_per_word: 400,
            fail_marker: None,
            with_subtitles: false,
            synth_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn with_voices(mut self, voices: &[&str]) -> Self {
        self.voices = voices.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_ms_per_word(mut self, ms_per_word: u64) -> Self {
        self.ms_per_word = ms_per_word.max(1);
        self
    }

    /// Fail every call whose text contains `marker`
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Return one cue spanning each clip
    pub fn with_subtitles(mut self) -> Self {
        self.with_subtitles = true;
        self
    }

    pub fn synth_calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Clip length the mock produces for `text`
    pub fn expected_duration_ms(&self, text: &str) -> u64 {
        text.split_whitespace().count().max(1) as u64 * self.ms_per_word
    }

    fn tone(&self, duration_ms: u64) -> AudioClip {
        let num_samples = (duration_ms * self.sample_rate as u64 / 1000) as usize;
        let frequency = 440.0;
        let amplitude = 0.3;

        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f64 / self.sample_rate as f64;
                let decay = 1.0 - (i as f64 / num_samples as f64) * 0.5;
                (amplitude * decay * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
            })
            .collect();

        AudioClip::new(samples, self.sample_rate)
    }
}

impl Default for MockTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsEngine for MockTtsEngine {
    fn engine_name(&self) -> &str {
        "mock"
    }

    async fn list_available_voices(&self) -> Result<Vec<String>, TtsError> {
        Ok(self.voices.clone())
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Synthesis, TtsError> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);

        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }
        if !self.voices.iter().any(|v| v == voice_id) {
            return Err(TtsError::InvalidVoice(voice_id.to_string()));
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(TtsError::Engine(format!("mock failure for '{}'", marker)));
            }
        }

        let duration_ms = self.expected_duration_ms(text);
        let clip = self.tone(duration_ms);
        let subtitle = self.with_subtitles.then(|| {
            Subtitle::new(vec![Cue {
                start_ms: 0,
                end_ms: duration_ms,
                text: text.to_string(),
            }])
        });

        ::log::debug!(
            "MockTtsEngine: synthesized {} chars with {} ({} ms)",
            text.len(),
            voice_id,
            duration_ms
        );

        Ok(Synthesis { clip, subtitle })
    }

    fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::chars(200)
    }

    async fn load(&self) -> Result<(), TtsError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) -> Result<(), TtsError> {
        self.loaded.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_engine_duration_and_calls() {
        let engine = MockTtsEngine::new().with_sample_rate(1000).with_ms_per_word(100);

        let synthesis = engine.synthesize("one two three", "mock_alto").await.unwrap();

        assert_eq!(synthesis.clip.duration_ms(), 300);
        assert_eq!(synthesis.clip.samples.len(), 300);
        assert!(synthesis.subtitle.is_none());
        assert_eq!(engine.synth_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_engine_failures() {
        let engine = MockTtsEngine::new().with_failure_marker("BOOM");

        assert!(matches!(engine.synthesize("  ", "mock_alto").await, Err(TtsError::EmptyText)));
        assert!(matches!(engine.synthesize("hi", "nobody").await, Err(TtsError::InvalidVoice(_))));
        assert!(matches!(engine.synthesize("go BOOM", "mock_bass").await, Err(TtsError::Engine(_))));
        assert_eq!(engine.synth_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_engine_lifecycle() {
        let engine = MockTtsEngine::new();
        assert!(!engine.is_loaded());

        engine.load().await.unwrap();
        assert!(engine.is_loaded());

        engine.unload().await.unwrap();
        assert!(!engine.is_loaded());
        assert_eq!(engine.load_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_engine_subtitles() {
        let engine = MockTtsEngine::new().with_subtitles();
        let synthesis = engine.synthesize("hello world", "mock_tenor").await.unwrap();

        let subtitle = synthesis.subtitle.unwrap();
        assert_eq!(subtitle.cues.len(), 1);
        assert_eq!(subtitle.cues[0].end_ms, 800);
    }

    #[test]
    fn test_registry_falls_back_to_default() {
        let mock: Arc<dyn TtsEngine> = Arc::new(MockTtsEngine::new());
        let registry = TtsRegistry::new("mock").with_engine("mock", mock);

        assert!(registry.get("edge_tts").is_none());
        let resolved = registry.resolve("edge_tts").unwrap();
        assert_eq!(resolved.engine_name(), "mock");
        assert_eq!(registry.names(), vec!["mock"]);
    }

    #[test]
    fn test_registry_without_default() {
        let registry = TtsRegistry::new("kokoro");
        assert!(registry.resolve("anything").is_none());
    }
}
