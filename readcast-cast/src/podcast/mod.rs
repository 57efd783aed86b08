//! Podcast Generator - Script or article text to a finished audio artifact
//!
//! Two pipelines share one timeline:
//! - podcast: parse turns, assign two voices, synthesize each turn
//! - narration: normalize and chunk text, read it with a single voice
//!
//! Per-turn clips are written under a per-run work directory. A failed turn
//! leaves a gap; only a run where nothing succeeded is an error. The work
//! directory is removed once the export has succeeded.

use std::path::{Path, PathBuf};

use crate::audio_mixer::{AudioMixer, MixerConfig};
use crate::audio_timeline::{AudioClip, AudioTimeline, DEFAULT_SAMPLE_RATE};
use crate::error::{CastError, CastResult};
use crate::subtitles::Subtitle;
use crate::text_chunker::{normalize_for_speech, TextChunker};
use crate::transcript_parser::TranscriptParser;
use crate::tts_engine::{Synthesis, TtsEngine, TtsError};
use crate::voice_assigner::{VoiceAssigner, VoiceMapping};

/// Speaker label used for single-voice narration
pub const NARRATOR: &str = "narrator";

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Sample rate of the assembled mix
    pub sample_rate: u32,
    /// Parent directory for per-run clip folders
    pub work_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            work_dir: std::env::temp_dir().join("readcast"),
        }
    }
}

/// Synthesized audio for one task, ready to export
#[derive(Debug)]
pub struct Assembly {
    pub timeline: AudioTimeline,
    pub voices: VoiceMapping,
    pub segments_total: usize,
    pub segments_failed: usize,
    work_dir: PathBuf,
}

/// Files produced by a successful export
#[derive(Debug, Clone)]
pub struct ExportedAudio {
    pub audio_file: PathBuf,
    pub subtitle_file: Option<PathBuf>,
    pub duration_ms: u64,
}

impl Assembly {
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Mix, write audio and subtitles next to `base_path`, then drop the clips
    pub fn export(self, base_path: &Path, config: &MixerConfig) -> CastResult<ExportedAudio> {
        let track = self.timeline.mixdown()?;
        let result = AudioMixer::new().export(&track, base_path, config)?;

        let subtitle_file = match self.timeline.merged_subtitle() {
            Some(subtitle) => {
                let path = base_path.with_extension("vtt");
                subtitle.write_vtt(&path)?;
                Some(path)
            }
            None => None,
        };

        self.discard();

        Ok(ExportedAudio {
            audio_file: result.output_file,
            subtitle_file,
            duration_ms: result.total_duration_ms,
        })
    }

    /// Remove the per-run clip folder
    pub fn discard(self) {
        remove_work_dir(&self.work_dir);
    }
}

fn remove_work_dir(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            ::log::warn!("Failed to remove work dir {}: {}", path.display(), e);
        }
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

pub struct PodcastGenerator {
    config: GeneratorConfig,
    parser: TranscriptParser,
    assigner: VoiceAssigner,
}

impl PodcastGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_assigner(config, VoiceAssigner::new())
    }

    pub fn with_assigner(config: GeneratorConfig, assigner: VoiceAssigner) -> Self {
        Self {
            config,
            parser: TranscriptParser::new(),
            assigner,
        }
    }

    pub fn assigner(&self) -> &VoiceAssigner {
        &self.assigner
    }

    /// Synthesize a two-speaker script turn by turn
    pub async fn assemble_podcast(
        &self,
        engine: &dyn TtsEngine,
        script: &str,
        voice1: Option<&str>,
        voice2: Option<&str>,
    ) -> CastResult<Assembly> {
        let turns = self.parser.parse(script)?;
        let voices = self.assigner.assign(engine, &turns, voice1, voice2).await?;

        let mut timeline = AudioTimeline::new(self.config.sample_rate);
        for speaker in voices.speakers() {
            timeline.set_pan(&speaker.label, speaker.pan);
        }

        let work_dir = self.create_work_dir()?;
        let chunker = TextChunker::new(engine.chunk_policy());
        let mut failed = 0;

        for (index, turn) in turns.iter().enumerate() {
            let voice_id = match voices.get_voice_for_speaker(&turn.speaker) {
                Some(config) => config.voice_id.as_str(),
                None => continue,
            };

            match Self::synthesize_text(engine, &chunker, &turn.text, voice_id).await {
                Ok(synthesis) => {
                    let clip_path = Self::save_clip(&work_dir, &turn.speaker, index, &synthesis.clip);
                    timeline.append(&turn.speaker, synthesis.clip, synthesis.subtitle, clip_path);
                }
                Err(e) => {
                    failed += 1;
                    ::log::warn!("Skipping turn {} ({}): {}", index, turn.speaker, e);
                }
            }
        }

        self.finish(timeline, voices, turns.len(), failed, work_dir)
    }

    /// Read plain text with one voice (picked at random when not given)
    pub async fn assemble_narration(
        &self,
        engine: &dyn TtsEngine,
        text: &str,
        voice: Option<&str>,
    ) -> CastResult<Assembly> {
        let chunker = TextChunker::new(engine.chunk_policy());
        let chunks = chunker.chunk(&normalize_for_speech(text));
        if chunks.is_empty() {
            return Err(CastError::Tts(TtsError::EmptyText));
        }

        let voice_id = match voice {
            Some(voice) => voice.to_string(),
            None => {
                let available = engine.list_available_voices().await?;
                self.assigner
                    .pick_voice(&available, None)
                    .ok_or_else(|| CastError::NoVoices(engine.engine_name().to_string()))?
            }
        };
        ::log::info!(
            "Narrating {} chunks with {} voice {}",
            chunks.len(),
            engine.engine_name(),
            voice_id
        );

        let mut timeline = AudioTimeline::new(self.config.sample_rate);
        timeline.set_pan(NARRATOR, 0.0);

        let work_dir = self.create_work_dir()?;
        let mut failed = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            match engine.synthesize(&chunk.text, &voice_id).await {
                Ok(synthesis) => {
                    let clip_path = Self::save_clip(&work_dir, NARRATOR, index, &synthesis.clip);
                    timeline.append(NARRATOR, synthesis.clip, synthesis.subtitle, clip_path);
                }
                Err(e) => {
                    failed += 1;
                    ::log::warn!("Skipping chunk {}: {}", index, e);
                }
            }
        }

        let voices = VoiceMapping::single(NARRATOR, voice_id);
        self.finish(timeline, voices, chunks.len(), failed, work_dir)
    }

    fn finish(
        &self,
        timeline: AudioTimeline,
        voices: VoiceMapping,
        total: usize,
        failed: usize,
        work_dir: PathBuf,
    ) -> CastResult<Assembly> {
        if timeline.is_empty() {
            remove_work_dir(&work_dir);
            return Err(CastError::NoAudioGenerated);
        }

        ::log::info!(
            "Assembled {}/{} segments ({} ms)",
            total - failed,
            total,
            timeline.total_duration_ms()
        );

        Ok(Assembly {
            timeline,
            voices,
            segments_total: total,
            segments_failed: failed,
            work_dir,
        })
    }

    fn create_work_dir(&self) -> CastResult<PathBuf> {
        let dir = self.config.work_dir.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Keep a copy of the clip on disk; a failed write only loses the copy
    fn save_clip(work_dir: &Path, speaker: &str, index: usize, clip: &AudioClip) -> Option<PathBuf> {
        let speaker_dir = work_dir.join(speaker);
        let path = speaker_dir.join(format!("segment_{:04}.wav", index));

        let written = std::fs::create_dir_all(&speaker_dir)
            .map_err(CastError::from)
            .and_then(|_| clip.write_wav(&path));

        match written {
            Ok(()) => Some(path),
            Err(e) => {
                ::log::warn!("Failed to keep clip {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Synthesize text that may exceed the engine's input limit
    async fn synthesize_text(
        engine: &dyn TtsEngine,
        chunker: &TextChunker,
        text: &str,
        voice_id: &str,
    ) -> Result<Synthesis, TtsError> {
        let chunks = chunker.chunk(text);
        if chunks.len() <= 1 {
            return engine.synthesize(text, voice_id).await;
        }

        let mut clip = AudioClip::new(Vec::new(), 0);
        let mut fragments: Vec<(u64, Subtitle)> = Vec::new();

        for chunk in &chunks {
            let part = engine.synthesize(&chunk.text, voice_id).await?;
            if let Some(subtitle) = part.subtitle {
                fragments.push((clip.duration_ms(), subtitle));
            }
            clip.append(&part.clip);
        }

        let subtitle = if fragments.is_empty() {
            None
        } else {
            Some(Subtitle::merge(fragments.iter().map(|(offset, s)| (*offset, s))))
        };

        Ok(Synthesis { clip, subtitle })
    }
}
