//! Task Store - Pending work persisted as a JSON array
//!
//! Producers `append`; the processor peeks the oldest record with
//! `dequeue_one` and removes it with `acknowledge` once it has been handled.
//! A crash between the two replays that one record on the next start.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::QueueResult;
use crate::json_file::{load_list, save_list, FileLock};
use crate::task::TaskRecord;

pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a record at the end of the queue
    pub fn append(&self, record: TaskRecord) -> QueueResult<()> {
        let _guard = self.lock.lock();
        let _file = FileLock::acquire(&self.path)?;

        let mut records = load_list::<TaskRecord>(&self.path);
        ::log::info!("Queued {} ({} pending)", record.label(), records.len() + 1);
        records.push(record);
        save_list(&self.path, &records)
    }

    /// All stored records, oldest first, without removing them
    pub fn drain_all(&self) -> Vec<TaskRecord> {
        let _guard = self.lock.lock();
        load_list(&self.path)
    }

    /// The oldest record, left in place until acknowledged
    pub fn dequeue_one(&self) -> Option<TaskRecord> {
        let _guard = self.lock.lock();
        load_list::<TaskRecord>(&self.path).into_iter().next()
    }

    /// Remove the first record equal to `record`
    ///
    /// Returns false when it is no longer in the store.
    pub fn acknowledge(&self, record: &TaskRecord) -> QueueResult<bool> {
        let _guard = self.lock.lock();
        let _file = FileLock::acquire(&self.path)?;

        let mut records = load_list::<TaskRecord>(&self.path);
        match records.iter().position(|r| r == record) {
            Some(index) => {
                records.remove(index);
                save_list(&self.path, &records)?;
                Ok(true)
            }
            None => {
                ::log::warn!("Acknowledged task not found in queue: {}", record.label());
                Ok(false)
            }
        }
    }

    /// Drop every pending record
    pub fn clear(&self) -> QueueResult<()> {
        let _guard = self.lock.lock();
        let _file = FileLock::acquire(&self.path)?;
        save_list::<TaskRecord>(&self.path, &[])
    }

    pub fn len(&self) -> usize {
        self.drain_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::task::InputType;

    fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path().join("tasks.json"));
        (dir, store)
    }

    #[test]
    fn test_unreadable_store_is_empty() {
        let (_dir, store) = store();
        assert!(store.drain_all().is_empty());
        assert!(store.dequeue_one().is_none());

        std::fs::write(store.path(), "").unwrap();
        assert!(store.drain_all().is_empty());

        std::fs::write(store.path(), "[{\"type\": \"url\",").unwrap();
        assert!(store.drain_all().is_empty());
    }

    #[test]
    fn test_append_after_corruption_starts_fresh() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "garbage").unwrap();

        store.append(TaskRecord::new(InputType::Text, "hello", "mock")).unwrap();

        let records = store.drain_all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_fifo_order_and_drain_keeps_records() {
        let (_dir, store) = store();
        for content in ["a", "b", "c"] {
            store.append(TaskRecord::new(InputType::Text, content, "mock")).unwrap();
        }

        let contents: Vec<_> = store.drain_all().into_iter().filter_map(|r| r.content).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert_eq!(store.len(), 3);

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_dequeue_and_acknowledge() {
        let (_dir, store) = store();
        store.append(TaskRecord::new(InputType::Text, "first", "mock")).unwrap();
        store.append(TaskRecord::new(InputType::Text, "second", "mock")).unwrap();

        let head = store.dequeue_one().unwrap();
        assert_eq!(head.content.as_deref(), Some("first"));
        assert_eq!(store.dequeue_one(), Some(head.clone()));

        assert!(store.acknowledge(&head).unwrap());
        assert!(!store.acknowledge(&head).unwrap());
        assert_eq!(store.dequeue_one().unwrap().content.as_deref(), Some("second"));
    }

    #[test]
    fn test_append_during_processing_is_kept() {
        let (_dir, store) = store();
        store.append(TaskRecord::new(InputType::Text, "in flight", "mock")).unwrap();

        let head = store.dequeue_one().unwrap();
        store.append(TaskRecord::new(InputType::Text, "late", "mock")).unwrap();
        store.acknowledge(&head).unwrap();

        let remaining = store.drain_all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content.as_deref(), Some("late"));
    }

    #[test]
    fn test_concurrent_appends() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let record = TaskRecord::new(InputType::Text, format!("{}-{}", t, i), "mock");
                        store.append(record).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 40);
    }
}
