//! Readcast Cast - Turn articles and two-speaker scripts into audio
//!
//! This crate provides:
//! - Two-speaker transcript parsing and voice assignment
//! - Text chunking sized to each engine's input limit
//! - A shared timeline that pans, mixes and exports speaker tracks
//! - Subtitle fragment stitching
//! - Pluggable TTS engines (mock, OpenAI-compatible, Kokoro)

pub mod audio_mixer;
pub mod audio_timeline;
pub mod error;
pub mod podcast;
pub mod subtitles;
pub mod text_chunker;
pub mod transcript_parser;
pub mod tts_engine;
pub mod tts_http;
pub mod voice_assigner;

pub use error::{CastError, CastResult};

// Re-export audio types
pub use audio_mixer::{AudioMetadata, AudioMixer, ExportFormat, MixerConfig, MixerResult, Mp3Bitrate};
pub use audio_timeline::{pan_gains, AudioClip, AudioTimeline, StereoTrack, TimelineEntry, DEFAULT_SAMPLE_RATE};
pub use subtitles::{Cue, Subtitle};

// Re-export pipeline types
pub use podcast::{Assembly, ExportedAudio, GeneratorConfig, PodcastGenerator, NARRATOR};
pub use text_chunker::{
    normalize_for_speech, resplit_strings, ChunkPolicy, LengthUnit, TextChunk, TextChunker, MIN_BYTE_BUDGET,
};
pub use transcript_parser::{SpeakerTurn, TranscriptParser, SPEAKER_ONE, SPEAKER_TWO};
pub use voice_assigner::{pick_random_voice, SpeakerConfig, VoiceAssigner, VoiceMapping};

// Re-export TTS engine types
pub use tts_engine::{MockTtsEngine, Synthesis, TtsEngine, TtsError, TtsRegistry};
pub use tts_http::{KokoroTtsConfig, KokoroTtsEngine, OpenAiTtsConfig, OpenAiTtsEngine};
