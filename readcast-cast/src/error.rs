//! Error types shared by the podcast assembly pipeline

use thiserror::Error;

use crate::tts_engine::TtsError;

/// Errors raised while turning text into a finished audio artifact
#[derive(Debug, Error)]
pub enum CastError {
    #[error("No valid speaker turns found in transcript")]
    NoValidTurns,

    #[error("TTS engine '{0}' returned no voices")]
    NoVoices(String),

    #[error("TTS engine '{engine}' offers no second voice distinct from '{taken}'")]
    NotEnoughVoices { engine: String, taken: String },

    #[error("Both speakers were assigned the same voice '{0}'")]
    DuplicateVoice(String),

    #[error("Speaker '{0}' exceeds the two-speaker layout")]
    UnsupportedSpeaker(String),

    #[error("No audio segments were successfully generated")]
    NoAudioGenerated,

    #[error("Invalid subtitle: {0}")]
    InvalidSubtitle(String),

    #[error("Audio encoding error: {0}")]
    Encoding(#[from] hound::Error),

    #[error("Export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CastResult<T> = Result<T, CastError>;
