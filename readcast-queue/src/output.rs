//! Output Layout - Where finished artifacts are written
//!
//! Each task gets `output_dir/YYYYMMDD/NNN.*`: the audio file, its subtitles
//! and a markdown transcript. `NNN` is the first number from 001 with no
//! file of that name in the day's folder.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::QueueResult;

#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.output_dir.join(date.format("%Y%m%d").to_string())
    }

    /// Path without extension for the next artifact set of `date`
    pub fn next_base(&self, date: NaiveDate) -> QueueResult<PathBuf> {
        let day_dir = self.day_dir(date);
        fs::create_dir_all(&day_dir)?;

        let taken: HashSet<String> = fs::read_dir(&day_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();

        let number = (1u32..)
            .find(|n| !taken.contains(&format!("{:03}", n)))
            .unwrap_or(1);

        Ok(day_dir.join(format!("{:03}", number)))
    }
}

/// Write the markdown transcript next to the audio
pub fn write_markdown(base_path: &Path, title: &str, text: &str, source: Option<&str>) -> QueueResult<PathBuf> {
    let path = base_path.with_extension("md");

    let mut content = String::new();
    if !title.trim().is_empty() {
        content.push_str(&format!("# {}\n\n", title.trim()));
    }
    content.push_str(text.trim());
    content.push('\n');
    if let Some(source) = source {
        content.push_str(&format!("\nSource: {}\n", source));
    }

    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_numbering_fills_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());

        let first = layout.next_base(date()).unwrap();
        assert_eq!(first, dir.path().join("20240309").join("001"));

        fs::write(first.with_extension("mp3"), b"").unwrap();
        fs::write(layout.day_dir(date()).join("003.md"), b"").unwrap();

        assert!(layout.next_base(date()).unwrap().ends_with("20240309/002"));

        fs::write(layout.day_dir(date()).join("002.vtt"), b"").unwrap();
        assert!(layout.next_base(date()).unwrap().ends_with("20240309/004"));
    }

    #[test]
    fn test_markdown_content() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("001");

        let path = write_markdown(&base, "Three Word Title", "Body text.\n", Some("https://example.com")).unwrap();
        let content = fs::read_to_string(path).unwrap();

        assert_eq!(
            content,
            "# Three Word Title\n\nBody text.\n\nSource: https://example.com\n"
        );
    }
}
