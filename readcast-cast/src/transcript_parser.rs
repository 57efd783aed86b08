//! Transcript Parser - Split a two-speaker script into ordered turns
//!
//! Scripts come from the LLM in the form:
//! ```text
//! speaker1: Welcome back to the show.
//! speaker2: (laughs) Glad to be here.
//! ```
//! Tags are case-insensitive and tolerate markdown bold and extra spaces.
//! Labels are kept as written; only `speaker1` and `speaker2` are accepted and
//! turns under any other label are dropped with a warning. Text before the
//! first tag belongs to `speaker1`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CastError, CastResult};

pub const SPEAKER_ONE: &str = "speaker1";
pub const SPEAKER_TWO: &str = "speaker2";

static SPEAKER_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*{0,2}\bspeaker\s*(\d+)\s*\*{0,2}\s*:\*{0,2}").unwrap());

/// Stage directions such as "(laughs)"
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Space left in front of punctuation once a direction is removed
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([.,!?;:])").unwrap());

// ============================================================================
// DATA MODELS
// ============================================================================

/// One speaker's contiguous utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub speaker: String,
    pub text: String,
}

impl SpeakerTurn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct TranscriptParser;

impl TranscriptParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a script into turns in document order
    pub fn parse(&self, transcript: &str) -> CastResult<Vec<SpeakerTurn>> {
        let tags: Vec<(usize, usize, Option<u32>)> = SPEAKER_TAG
            .captures_iter(transcript)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let number = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
                Some((whole.start(), whole.end(), number))
            })
            .collect();

        let mut turns = Vec::new();

        let leading_end = tags.first().map_or(transcript.len(), |(start, _, _)| *start);
        Self::push_turn(&mut turns, SPEAKER_ONE, &transcript[..leading_end]);

        for (i, (_, end, number)) in tags.iter().enumerate() {
            let next_start = tags.get(i + 1).map_or(transcript.len(), |(start, _, _)| *start);
            let fragment = &transcript[*end..next_start];

            match number {
                Some(1) => Self::push_turn(&mut turns, SPEAKER_ONE, fragment),
                Some(2) => Self::push_turn(&mut turns, SPEAKER_TWO, fragment),
                other => {
                    ::log::warn!(
                        "Dropping turn for unsupported speaker {:?}: {}",
                        other,
                        Self::preview(fragment)
                    );
                }
            }
        }

        if turns.is_empty() {
            return Err(CastError::NoValidTurns);
        }

        ::log::debug!("Parsed {} turns from transcript", turns.len());
        Ok(turns)
    }

    /// Remove stage directions and collapse whitespace
    pub fn clean_utterance(text: &str) -> String {
        let without_directions = PARENTHETICAL.replace_all(text, " ");
        let collapsed = WHITESPACE.replace_all(&without_directions, " ");
        SPACE_BEFORE_PUNCT
            .replace_all(collapsed.trim(), "$1")
            .into_owned()
    }

    fn push_turn(turns: &mut Vec<SpeakerTurn>, speaker: &str, fragment: &str) {
        let text = Self::clean_utterance(fragment);
        if !text.is_empty() {
            turns.push(SpeakerTurn::new(speaker, text));
        }
    }

    fn preview(text: &str) -> String {
        let trimmed = text.trim();
        match trimmed.char_indices().nth(40) {
            Some((cut, _)) => format!("{}...", &trimmed[..cut]),
            None => trimmed.to_string(),
        }
    }
}

/// Distinct speaker labels in order of first appearance
pub fn speakers_in_order(turns: &[SpeakerTurn]) -> Vec<String> {
    let mut speakers: Vec<String> = Vec::new();
    for turn in turns {
        if !speakers.iter().any(|s| s == &turn.speaker) {
            speakers.push(turn.speaker.clone());
        }
    }
    speakers
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(turns: &[SpeakerTurn]) -> Vec<(&str, &str)> {
        turns
            .iter()
            .map(|t| (t.speaker.as_str(), t.text.as_str()))
            .collect()
    }

    #[test]
    fn test_inline_tags_and_stage_directions() {
        let turns = TranscriptParser::new()
            .parse("speaker1: Hello (laughs) there. speaker2: Hi!")
            .unwrap();

        assert_eq!(pairs(&turns), vec![("speaker1", "Hello there."), ("speaker2", "Hi!")]);
    }

    #[test]
    fn test_case_whitespace_and_markdown_tags() {
        let script = "SPEAKER 1 :  Welcome   to\nthe show.\n**Speaker2:** Thanks (smiles)!\nspeaker1: Let's start.";
        let turns = TranscriptParser::new().parse(script).unwrap();

        assert_eq!(
            pairs(&turns),
            vec![
                ("speaker1", "Welcome to the show."),
                ("speaker2", "Thanks!"),
                ("speaker1", "Let's start."),
            ]
        );
    }

    #[test]
    fn test_leading_fragment_goes_to_speaker_one() {
        let turns = TranscriptParser::new()
            .parse("Intro words. speaker2: Reply.")
            .unwrap();

        assert_eq!(pairs(&turns), vec![("speaker1", "Intro words."), ("speaker2", "Reply.")]);
    }

    #[test]
    fn test_unknown_speakers_are_dropped() {
        let turns = TranscriptParser::new()
            .parse("speaker1: One. speaker3: Ignored. speaker2: Two.")
            .unwrap();

        assert_eq!(pairs(&turns), vec![("speaker1", "One."), ("speaker2", "Two.")]);
    }

    #[test]
    fn test_no_valid_turns() {
        let parser = TranscriptParser::new();

        assert!(matches!(parser.parse(""), Err(CastError::NoValidTurns)));
        assert!(matches!(parser.parse("speaker1: (sighs) speaker2:"), Err(CastError::NoValidTurns)));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let script = "speaker1: A. speaker2: B. speaker1: C.";
        let parser = TranscriptParser::new();
        assert_eq!(parser.parse(script).unwrap(), parser.parse(script).unwrap());
    }

    #[test]
    fn test_speakers_in_order() {
        let turns = vec![
            SpeakerTurn::new("speaker2", "a"),
            SpeakerTurn::new("speaker1", "b"),
            SpeakerTurn::new("speaker2", "c"),
        ];
        assert_eq!(speakers_in_order(&turns), vec!["speaker2", "speaker1"]);
    }
}
