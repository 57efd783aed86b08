//! JSON list files shared between processes
//!
//! Reads never fail: a missing, empty or unparseable file is an empty list.
//! Writes go to a sibling temp file that is renamed over the target, and a
//! `.lock` file serializes read-modify-write cycles across processes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(20);
/// A lock older than this is assumed to belong to a dead process
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

/// Load a JSON array, keeping only the elements that decode as `T`
pub fn load_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            ::log::warn!("Failed to read {}: {}, treating as empty", path.display(), e);
            return Vec::new();
        }
    };

    if content.trim().is_empty() {
        return Vec::new();
    }

    let items = match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
        Ok(items) => items,
        Err(e) => {
            ::log::warn!("Failed to parse {}: {}, treating as empty", path.display(), e);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(value) => Some(value),
            Err(e) => {
                ::log::warn!("Ignoring malformed entry in {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Replace the file's content with `items`
pub fn save_list<T: Serialize>(path: &Path, items: &[T]) -> QueueResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(items)?;
    let temp = sibling(path, "tmp");
    fs::write(&temp, json)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Exclusive lock on a JSON file, released on drop
///
/// The lock file holds a random token so that only its owner removes it,
/// and a stale lock is broken only if it still holds the token seen stale.
pub struct FileLock {
    path: PathBuf,
    token: String,
}

impl FileLock {
    pub fn acquire(target: &Path) -> QueueResult<Self> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let path = sibling(target, "lock");
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(token.as_bytes())?;
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(owner) = Self::stale_owner(&path) {
                        if Self::break_stale(&path, &owner) {
                            ::log::warn!("Removed stale lock {}", path.display());
                            continue;
                        }
                    }
                    if started.elapsed() > LOCK_TIMEOUT {
                        return Err(QueueError::LockTimeout(path.display().to_string()));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Token of a lock old enough to belong to a dead process
    fn stale_owner(path: &Path) -> Option<String> {
        let age = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())?;
        if age <= STALE_LOCK_AGE {
            return None;
        }
        fs::read_to_string(path).ok()
    }

    /// Move the lock aside and delete it if it still belongs to `owner`
    ///
    /// A lock taken over since the staleness check is put back.
    fn break_stale(path: &Path, owner: &str) -> bool {
        let aside = sibling(path, &format!("stale-{}", Uuid::new_v4()));
        if fs::rename(path, &aside).is_err() {
            return false;
        }

        let taken = fs::read_to_string(&aside).unwrap_or_default();
        if taken == owner {
            let _ = fs::remove_file(&aside);
            return true;
        }

        if let Err(e) = fs::hard_link(&aside, path) {
            ::log::warn!("Could not restore live lock {}: {}", path.display(), e);
        }
        let _ = fs::remove_file(&aside);
        false
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let owned = fs::read_to_string(&self.path).map_or(false, |content| content == self.token);
        if owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
