//! Subtitle fragments - Parse, shift and stitch timed captions
//!
//! Engines that report word or phrase timing hand back a fragment in SRT or
//! WebVTT form. Each fragment is relative to its own clip, so the timeline
//! shifts it by the clip's start offset before stitching everything into a
//! single WebVTT file.

use std::path::Path;

use crate::error::{CastError, CastResult};

// ============================================================================
// DATA MODELS
// ============================================================================

/// One timed caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Ordered list of cues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtitle {
    pub cues: Vec<Cue>,
}

impl Subtitle {
    pub fn new(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Parse SRT or WebVTT content
    ///
    /// Blocks without a timing line (headers, NOTE and STYLE blocks) are
    /// ignored. A timing line that cannot be read is an error.
    pub fn parse(content: &str) -> CastResult<Self> {
        let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let mut cues = Vec::new();

        for block in normalized.split("\n\n") {
            let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
            let timing_index = match lines.iter().position(|l| l.contains("-->")) {
                Some(index) => index,
                None => continue,
            };

            let (start_ms, end_ms) = parse_timing_line(lines[timing_index])?;
            let text = lines[timing_index + 1..].join("\n");

            cues.push(Cue {
                start_ms,
                end_ms,
                text,
            });
        }

        if cues.is_empty() && !normalized.trim().is_empty() && !normalized.trim_start().starts_with("WEBVTT") {
            return Err(CastError::InvalidSubtitle("no cues found".to_string()));
        }

        Ok(Self { cues })
    }

    /// Copy of this fragment with every cue moved later by `offset_ms`
    pub fn shifted(&self, offset_ms: u64) -> Self {
        Self {
            cues: self
                .cues
                .iter()
                .map(|cue| Cue {
                    start_ms: cue.start_ms + offset_ms,
                    end_ms: cue.end_ms + offset_ms,
                    text: cue.text.clone(),
                })
                .collect(),
        }
    }

    /// Shift each fragment by its offset and concatenate them in offset order
    ///
    /// Fragments sharing an offset keep the order they were given in.
    pub fn merge<'a>(fragments: impl IntoIterator<Item = (u64, &'a Subtitle)>) -> Self {
        let mut ordered: Vec<(u64, &Subtitle)> = fragments.into_iter().collect();
        ordered.sort_by_key(|(offset, _)| *offset);

        let mut cues = Vec::new();
        for (offset, fragment) in ordered {
            cues.extend(fragment.shifted(offset).cues);
        }
        Self { cues }
    }

    /// Render as WebVTT, renumbering cues from 1
    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for (i, cue) in self.cues.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_timestamp(cue.start_ms, '.'),
                format_timestamp(cue.end_ms, '.'),
                cue.text
            ));
        }
        out
    }

    /// Render as SRT, renumbering cues from 1
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_timestamp(cue.start_ms, ','),
                format_timestamp(cue.end_ms, ','),
                cue.text
            ));
        }
        out
    }

    pub fn write_vtt(&self, path: &Path) -> CastResult<()> {
        std::fs::write(path, self.to_vtt())?;
        Ok(())
    }
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

fn parse_timing_line(line: &str) -> CastResult<(u64, u64)> {
    let mut parts = line.split("-->");
    let start = parts.next().unwrap_or_default().trim();
    // WebVTT allows cue settings after the end timestamp
    let end = parts
        .next()
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();

    match (parse_timestamp(start), parse_timestamp(end)) {
        (Some(start_ms), Some(end_ms)) if end_ms >= start_ms => Ok((start_ms, end_ms)),
        _ => Err(CastError::InvalidSubtitle(format!("bad timing line '{}'", line.trim()))),
    }
}

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` into milliseconds
fn parse_timestamp(value: &str) -> Option<u64> {
    let value = value.trim().replace(',', ".");
    let fields: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (seconds, "0"),
    };
    let whole: u64 = whole.parse().ok()?;
    // Pad or cut the fraction to exactly three digits
    let millis: u64 = format!("{:0<3}", fraction).get(..3)?.parse().ok()?;

    Some(((hours * 60 + minutes) * 60 + whole) * 1000 + millis)
}

fn format_timestamp(ms: u64, separator: char) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, seconds, separator, ms % 1000)
}

// ============================================================================
// TESTS
// ============================================================================
