//! Audio Export - Write the final mix as WAV or MP3
//!
//! This module provides:
//! - Optional RMS normalization of the stereo mix
//! - WAV export through hound
//! - MP3 export through ffmpeg with ID3 tags

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio_timeline::StereoTrack;
use crate::error::{CastError, CastResult};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// WAV format (uncompressed)
    Wav,
    /// MP3 format (compressed, requires ffmpeg)
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }
}

/// MP3 bitrate options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mp3Bitrate {
    Kbps128,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Mp3Bitrate {
    /// Get bitrate value in kbps
    pub fn kbps(&self) -> u32 {
        match self {
            Mp3Bitrate::Kbps128 => 128,
            Mp3Bitrate::Kbps192 => 192,
            Mp3Bitrate::Kbps256 => 256,
            Mp3Bitrate::Kbps320 => 320,
        }
    }

    /// Closest supported bitrate at or below `kbps`
    pub fn from_kbps(kbps: u32) -> Self {
        match kbps {
            0..=191 => Mp3Bitrate::Kbps128,
            192..=255 => Mp3Bitrate::Kbps192,
            256..=319 => Mp3Bitrate::Kbps256,
            _ => Mp3Bitrate::Kbps320,
        }
    }
}

/// Tags written into exported MP3 files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
}

impl AudioMetadata {
    /// Tags used for every generated episode
    pub fn episode(title: impl Into<String>, date: &str) -> Self {
        Self {
            title: Some(title.into()),
            artist: Some("READ2ME".to_string()),
            album: Some(format!("READ2ME {}", date)),
            genre: Some("Spoken Audio".to_string()),
            comment: None,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone)]
pub struct MixerConfig {
    pub export_format: ExportFormat,
    /// MP3 bitrate (only used if export_format is MP3)
    pub mp3_bitrate: Mp3Bitrate,
    /// Normalize the mix to this RMS level in dBFS before export
    pub normalize_db: Option<f32>,
    pub metadata: AudioMetadata,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            export_format: ExportFormat::Wav,
            mp3_bitrate: Mp3Bitrate::Kbps192,
            normalize_db: None,
            metadata: AudioMetadata::default(),
        }
    }
}

/// Export result
#[derive(Debug, Clone)]
pub struct MixerResult {
    /// Output file path (with extension)
    pub output_file: PathBuf,
    pub total_duration_ms: u64,
    pub file_size_bytes: u64,
}

// ============================================================================
// AUDIO MIXER
// ============================================================================

/// Writes finished mixes to disk
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioMixer;

impl AudioMixer {
    pub fn new() -> Self {
        Self
    }

    /// Export `track` to `base_path` plus the format's extension
    pub fn export(&self, track: &StereoTrack, base_path: &Path, config: &MixerConfig) -> CastResult<MixerResult> {
        if track.frames() == 0 {
            return Err(CastError::NoAudioGenerated);
        }

        if let Some(parent) = base_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let normalized;
        let track = match config.normalize_db {
            Some(target_db) => {
                normalized = Self::normalize(track, target_db);
                &normalized
            }
            None => track,
        };

        let output_file = base_path.with_extension(config.export_format.extension());
        match config.export_format {
            ExportFormat::Wav => track.write_wav(&output_file)?,
            ExportFormat::Mp3 => Self::write_mp3_file(&output_file, track, config)?,
        }

        let file_size_bytes = std::fs::metadata(&output_file).map(|m| m.len()).unwrap_or(0);

        ::log::info!(
            "Exported {} ({:.1}s, {} bytes)",
            output_file.display(),
            track.duration_ms() as f64 / 1000.0,
            file_size_bytes
        );

        Ok(MixerResult {
            output_file,
            total_duration_ms: track.duration_ms(),
            file_size_bytes,
        })
    }

    /// Scale the mix so its RMS matches `target_db` dBFS
    fn normalize(track: &StereoTrack, target_db: f32) -> StereoTrack {
        let count = (track.left.len() + track.right.len()) as f64;
        let sum_squares: f64 = track
            .left
            .iter()
            .chain(track.right.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        let rms = (sum_squares / count.max(1.0)).sqrt();

        if rms < 1e-9 {
            return track.clone();
        }

        let target_rms = 10_f64.powf(target_db as f64 / 20.0);
        // Keep amplification in a sane range and never push the peak past full scale
        let mut amplification = (target_rms / rms).clamp(0.1, 10.0) as f32;
        let peak = track.peak();
        if peak * amplification > 1.0 {
            amplification = 1.0 / peak;
        }

        ::log::info!(
            "Audio normalized: RMS {:.2} dB -> {:.2} dB (amplification: {:.2}x)",
            20.0 * rms.log10(),
            target_db,
            amplification
        );

        StereoTrack {
            left: track.left.iter().map(|s| s * amplification).collect(),
            right: track.right.iter().map(|s| s * amplification).collect(),
            sample_rate: track.sample_rate,
        }
    }

    /// Encode through ffmpeg from a temporary WAV next to the target
    fn write_mp3_file(path: &Path, track: &StereoTrack, config: &MixerConfig) -> CastResult<()> {
        let temp_wav = path.with_extension("tmp.wav");
        track.write_wav(&temp_wav)?;

        let mut cmd = std::process::Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&temp_wav)
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg(format!("{}k", config.mp3_bitrate.kbps()));

        let tags = [
            ("title", &config.metadata.title),
            ("artist", &config.metadata.artist),
            ("album", &config.metadata.album),
            ("genre", &config.metadata.genre),
            ("comment", &config.metadata.comment),
        ];
        for (key, value) in tags {
            if let Some(value) = value {
                cmd.arg("-metadata").arg(format!("{}={}", key, value));
            }
        }
        cmd.arg(path);

        let output = cmd.output();
        let _ = std::fs::remove_file(&temp_wav);

        match output {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(CastError::Export(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) => Err(CastError::Export(format!(
                "ffmpeg conversion failed: {}. Is ffmpeg installed?",
                e
            ))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_track(frames: usize, value: f32) -> StereoTrack {
        StereoTrack {
            left: vec![value; frames],
            right: vec![value; frames],
            sample_rate: 24_000,
        }
    }

    #[test]
    fn test_wav_export() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("20240102").join("001");

        let result = AudioMixer::new()
            .export(&test_track(24_000, 0.2), &base, &MixerConfig::default())
            .unwrap();

        assert_eq!(result.output_file, dir.path().join("20240102").join("001.wav"));
        assert_eq!(result.total_duration_ms, 1000);

        let reader = hound::WavReader::open(&result.output_file).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.duration(), 24_000);
    }

    #[test]
    fn test_empty_track_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = AudioMixer::new().export(&test_track(0, 0.0), &dir.path().join("x"), &MixerConfig::default());
        assert!(matches!(result, Err(CastError::NoAudioGenerated)));
    }

    #[test]
    fn test_normalize_respects_peak() {
        let quiet = test_track(100, 0.01);
        let louder = AudioMixer::normalize(&quiet, -3.0);

        assert!(louder.peak() <= 1.0);
        assert!(louder.peak() > quiet.peak());
    }

    #[test]
    fn test_bitrate_from_kbps() {
        assert_eq!(Mp3Bitrate::from_kbps(64), Mp3Bitrate::Kbps128);
        assert_eq!(Mp3Bitrate::from_kbps(192), Mp3Bitrate::Kbps192);
        assert_eq!(Mp3Bitrate::from_kbps(320), Mp3Bitrate::Kbps320);
    }

    #[test]
    fn test_episode_metadata() {
        let metadata = AudioMetadata::episode("Rust Queues Explained", "2024-01-02");
        assert_eq!(metadata.album.as_deref(), Some("READ2ME 2024-01-02"));
        assert_eq!(metadata.genre.as_deref(), Some("Spoken Audio"));
    }
}
