use std::path::Path;

use crate::audio_mixer::MixerConfig;
use crate::error::CastError;
use crate::podcast::{GeneratorConfig, PodcastGenerator, NARRATOR};
use crate::tts_engine::MockTtsEngine;
use crate::voice_assigner::{VoiceAssigner, FIRST_SPEAKER_PAN, SECOND_SPEAKER_PAN};

const SCRIPT: &str = "speaker1: Hello there friend. speaker2: Hi. speaker1: Bye now.";

fn generator(work_dir: &Path) -> PodcastGenerator {
    PodcastGenerator::with_assigner(
        GeneratorConfig {
            sample_rate: 1000,
            work_dir: work_dir.to_path_buf(),
        },
        VoiceAssigner::with_seed(42),
    )
}

fn engine() -> MockTtsEngine {
    MockTtsEngine::new().with_sample_rate(1000).with_ms_per_word(100)
}

fn run_dirs(work_dir: &Path) -> usize {
    std::fs::read_dir(work_dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_podcast_turns_play_sequentially() {
    let work = tempfile::tempdir().unwrap();
    let engine = engine();

    let assembly = generator(work.path())
        .assemble_podcast(&engine, SCRIPT, None, None)
        .await
        .unwrap();

    let offsets: Vec<u64> = assembly.timeline.entries().iter().map(|e| e.start_offset_ms).collect();
    assert_eq!(offsets, vec![0, 300, 400]);
    assert_eq!(assembly.timeline.total_duration_ms(), 600);
    assert_eq!(assembly.segments_total, 3);
    assert_eq!(assembly.segments_failed, 0);

    assert_eq!(assembly.timeline.pan_for("speaker1"), Some(FIRST_SPEAKER_PAN));
    assert_eq!(assembly.timeline.pan_for("speaker2"), Some(SECOND_SPEAKER_PAN));

    let one = &assembly.voices.get_voice_for_speaker("speaker1").unwrap().voice_id;
    let two = &assembly.voices.get_voice_for_speaker("speaker2").unwrap().voice_id;
    assert_ne!(one, two);
}

#[tokio::test]
async fn test_clips_kept_until_export_succeeds() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let engine = engine();

    let assembly = generator(work.path())
        .assemble_podcast(&engine, SCRIPT, Some("mock_alto"), Some("mock_bass"))
        .await
        .unwrap();

    let clip_paths: Vec<_> = assembly.timeline.clip_paths().map(Path::to_path_buf).collect();
    assert_eq!(clip_paths.len(), 3);
    assert!(clip_paths.iter().all(|p| p.exists()));
    assert!(clip_paths[1].ends_with("speaker2/segment_0001.wav"));

    let exported = assembly.export(&out.path().join("001"), &MixerConfig::default()).unwrap();

    assert!(exported.audio_file.exists());
    assert_eq!(exported.duration_ms, 600);
    assert!(exported.subtitle_file.is_none());
    assert!(clip_paths.iter().all(|p| !p.exists()));
    assert_eq!(run_dirs(work.path()), 0);
}

#[tokio::test]
async fn test_failed_turn_leaves_gap() {
    let work = tempfile::tempdir().unwrap();
    let engine = engine().with_failure_marker("Hi.");

    let assembly = generator(work.path())
        .assemble_podcast(&engine, SCRIPT, None, None)
        .await
        .unwrap();

    assert_eq!(assembly.segments_failed, 1);
    let speakers: Vec<&str> = assembly.timeline.entries().iter().map(|e| e.speaker.as_str()).collect();
    assert_eq!(speakers, vec!["speaker1", "speaker1"]);
    assert_eq!(assembly.timeline.total_duration_ms(), 500);
}

#[tokio::test]
async fn test_no_successful_turns_is_an_error() {
    let work = tempfile::tempdir().unwrap();
    let engine = engine().with_failure_marker(".");

    let result = generator(work.path())
        .assemble_podcast(&engine, SCRIPT, None, None)
        .await;

    assert!(matches!(result, Err(CastError::NoAudioGenerated)));
    assert_eq!(engine.synth_calls(), 3);
    assert_eq!(run_dirs(work.path()), 0);
}

#[tokio::test]
async fn test_single_voice_engine_cannot_host_podcast() {
    let work = tempfile::tempdir().unwrap();
    let engine = engine().with_voices(&["only_one"]);

    let result = generator(work.path())
        .assemble_podcast(&engine, SCRIPT, None, None)
        .await;

    assert!(matches!(result, Err(CastError::NotEnoughVoices { .. })));
    assert_eq!(engine.synth_calls(), 0);
}

#[tokio::test]
async fn test_long_turn_is_chunked() {
    let work = tempfile::tempdir().unwrap();
    let engine = engine();
    let long_turn = "This sentence is padded out to be long enough. ".repeat(10);
    let script = format!("speaker1: {} speaker2: Short.", long_turn);

    let assembly = generator(work.path())
        .assemble_podcast(&engine, &script, None, None)
        .await
        .unwrap();

    assert_eq!(assembly.timeline.entries().len(), 2);
    assert!(engine.synth_calls() > 2);

    let words = long_turn.split_whitespace().count() as u64;
    assert_eq!(assembly.timeline.entries()[1].start_offset_ms, words * 100);
}

#[tokio::test]
async fn test_narration_with_subtitles() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let engine = engine().with_subtitles();
    let text = "# Heading\n\nFirst paragraph has **bold** words. ".to_string()
        + &"Another sentence follows here. ".repeat(12);

    let assembly = generator(work.path())
        .assemble_narration(&engine, &text, None)
        .await
        .unwrap();

    assert!(assembly.segments_total > 1);
    assert!(assembly.timeline.entries().iter().all(|e| e.speaker == NARRATOR));
    assert_eq!(assembly.timeline.pan_for(NARRATOR), Some(0.0));

    let exported = assembly.export(&out.path().join("002"), &MixerConfig::default()).unwrap();
    let subtitle_file = exported.subtitle_file.unwrap();
    let vtt = std::fs::read_to_string(subtitle_file).unwrap();

    assert!(vtt.starts_with("WEBVTT"));
    assert!(vtt.contains("Heading"));
    assert!(!vtt.contains("**"));
}

#[tokio::test]
async fn test_narration_of_empty_text() {
    let work = tempfile::tempdir().unwrap();
    let result = generator(work.path())
        .assemble_narration(&engine(), "  \n ", Some("mock_alto"))
        .await;

    assert!(matches!(result, Err(CastError::Tts(_))));
}
