//! History Store - URLs that have already been turned into audio

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::QueueResult;
use crate::json_file::{load_list, save_list, FileLock};

pub struct HistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, url: &str) -> bool {
        let url = url.trim();
        let _guard = self.lock.lock();
        load_list::<String>(&self.path).iter().any(|u| u == url)
    }

    /// Remember `url`; recording it twice is a no-op
    pub fn record(&self, url: &str) -> QueueResult<()> {
        let url = url.trim();
        let _guard = self.lock.lock();
        let _file = FileLock::acquire(&self.path)?;

        let mut urls = load_list::<String>(&self.path);
        if urls.iter().any(|u| u == url) {
            return Ok(());
        }
        urls.push(url.to_string());
        save_list(&self.path, &urls)
    }

    pub fn urls(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        load_list(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.json"));

        assert!(!history.contains("https://example.com/a"));

        history.record("https://example.com/a").unwrap();
        history.record(" https://example.com/a ").unwrap();
        history.record("https://example.com/b").unwrap();

        assert!(history.contains("https://example.com/a"));
        assert_eq!(history.urls(), vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_corrupt_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let history = HistoryStore::new(&path);
        assert!(history.urls().is_empty());

        history.record("https://example.com/c").unwrap();
        assert!(history.contains("https://example.com/c"));
    }
}
