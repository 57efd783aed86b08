//! Voice Assigner - Bind speaker labels to distinct engine voices

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{CastError, CastResult};
use crate::transcript_parser::{speakers_in_order, SpeakerTurn};
use crate::tts_engine::TtsEngine;

/// Pan for the first speaker encountered in a script
pub const FIRST_SPEAKER_PAN: f32 = -0.2;
/// Pan for the second speaker encountered in a script
pub const SECOND_SPEAKER_PAN: f32 = 0.2;

// ============================================================================
// VOICE CONFIGURATION
// ============================================================================

/// Voice and stereo position for one speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    pub label: String,
    pub voice_id: String,
    /// Stereo pan in -1.0..=1.0
    pub pan: f32,
}

/// Voice mapping for all speakers of a podcast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceMapping {
    voices: Vec<SpeakerConfig>,
}

impl VoiceMapping {
    /// Mapping with one centred speaker
    pub fn single(label: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            voices: vec![SpeakerConfig {
                label: label.into(),
                voice_id: voice_id.into(),
                pan: 0.0,
            }],
        }
    }

    pub fn get_voice_for_speaker(&self, speaker: &str) -> Option<&SpeakerConfig> {
        self.voices.iter().find(|v| v.label == speaker)
    }

    pub fn speakers(&self) -> &[SpeakerConfig] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

/// Bind the first two distinct speakers to `voice1` and `voice2`
pub fn bind_speakers(turns: &[SpeakerTurn], voice1: &str, voice2: &str) -> CastResult<VoiceMapping> {
    let slots = [(voice1, FIRST_SPEAKER_PAN), (voice2, SECOND_SPEAKER_PAN)];
    let mut voices = Vec::new();

    for (index, label) in speakers_in_order(turns).into_iter().enumerate() {
        let (voice_id, pan) = slots
            .get(index)
            .ok_or_else(|| CastError::UnsupportedSpeaker(label.clone()))?;
        voices.push(SpeakerConfig {
            label,
            voice_id: voice_id.to_string(),
            pan: *pan,
        });
    }

    Ok(VoiceMapping { voices })
}

// ============================================================================
// ASSIGNER
// ============================================================================

/// Picks voices at random from what an engine offers
pub struct VoiceAssigner {
    rng: Mutex<StdRng>,
}

impl VoiceAssigner {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible picks, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Query the engine's voices and bind both speakers of `turns`
    pub async fn assign(
        &self,
        engine: &dyn TtsEngine,
        turns: &[SpeakerTurn],
        voice1: Option<&str>,
        voice2: Option<&str>,
    ) -> CastResult<VoiceMapping> {
        let available = engine.list_available_voices().await?;
        let (first, second) = self.choose(engine.engine_name(), &available, voice1, voice2)?;

        ::log::info!(
            "Voices for {}: speaker1={}, speaker2={}",
            engine.engine_name(),
            first,
            second
        );

        bind_speakers(turns, &first, &second)
    }

    /// Resolve both voices, picking missing ones so the two always differ
    pub fn choose(
        &self,
        engine_name: &str,
        available: &[String],
        voice1: Option<&str>,
        voice2: Option<&str>,
    ) -> CastResult<(String, String)> {
        if available.is_empty() {
            return Err(CastError::NoVoices(engine_name.to_string()));
        }

        let first = match voice1 {
            Some(voice) => voice.to_string(),
            None => self
                .pick_voice(available, None)
                .ok_or_else(|| CastError::NoVoices(engine_name.to_string()))?,
        };

        let second = match voice2 {
            Some(voice) => voice.to_string(),
            None => self
                .pick_voice(available, Some(&first))
                .ok_or_else(|| CastError::NotEnoughVoices {
                    engine: engine_name.to_string(),
                    taken: first.clone(),
                })?,
        };

        if first == second {
            return Err(CastError::DuplicateVoice(first));
        }

        Ok((first, second))
    }

    /// Random voice from `available`, never `exclude`
    pub fn pick_voice(&self, available: &[String], exclude: Option<&str>) -> Option<String> {
        let candidates: Vec<&String> = available
            .iter()
            .filter(|v| Some(v.as_str()) != exclude)
            .collect();

        let mut rng = self.rng.lock();
        candidates.choose(&mut *rng).map(|v| v.to_string())
    }
}

impl Default for VoiceAssigner {
    fn default() -> Self {
        Self::new()
    }
}

/// Random voice for single-narrator reads
pub fn pick_random_voice(voices: &[String], exclude: Option<&str>) -> Option<String> {
    voices
        .iter()
        .filter(|v| Some(v.as_str()) != exclude)
        .collect::<Vec<_>>()
        .choose(&mut rand::thread_rng())
        .map(|v| v.to_string())
}

// ============================================================================
// TESTS
// ============================================================================
