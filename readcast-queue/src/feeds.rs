//! Feed Scheduler - Enqueue new articles from RSS/Atom sources
//!
//! `sources.json` lists feeds and keywords. A source whose keywords contain
//! `*` takes its newest entries; otherwise an entry is taken when a global or
//! source keyword appears in its link. Runs on a fixed daily schedule or
//! every N minutes, on its own thread.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};
use crate::history::HistoryStore;
use crate::task::{InputType, TaskRecord};
use crate::task_store::TaskStore;

/// Cap for sources that take every entry
pub const MAX_ARTICLES_PER_SOURCE: usize = 10;

/// Local times of the daily fetches
pub const DAILY_FETCH_TIMES: [(u32, u32); 4] = [(0, 0), (5, 0), (12, 0), (19, 0)];

// ============================================================================
// SOURCES FILE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub global_keywords: Vec<String>,
    #[serde(default)]
    pub sources: Vec<FeedSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FeedSource {
    pub fn takes_all(&self) -> bool {
        self.keywords.iter().any(|k| k.trim() == "*")
    }
}

impl SourcesConfig {
    /// Starter file showing both keyword styles
    pub fn sample() -> Self {
        Self {
            global_keywords: vec!["example".to_string(), "test".to_string()],
            sources: vec![
                FeedSource {
                    url: "https://example.com/feed.xml".to_string(),
                    keywords: vec!["specific".to_string(), "example".to_string()],
                },
                FeedSource {
                    url: "https://all-articles-example.com/rss".to_string(),
                    keywords: vec!["*".to_string()],
                },
            ],
        }
    }

    /// Read the sources file; a missing file is replaced by a sample and
    /// yields no sources
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                ::log::warn!("Failed to parse {}: {}, no feeds configured", path.display(), e);
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match Self::write_sample(path) {
                    Ok(()) => ::log::info!("Created sample sources file {}", path.display()),
                    Err(e) => ::log::warn!("Failed to create sample {}: {}", path.display(), e),
                }
                Self::default()
            }
            Err(e) => {
                ::log::warn!("Failed to read {}: {}, no feeds configured", path.display(), e);
                Self::default()
            }
        }
    }

    fn write_sample(path: &Path) -> QueueResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&Self::sample())?)?;
        Ok(())
    }
}

// ============================================================================
// KEYWORD MATCHING
// ============================================================================

/// Case-insensitive whole-word patterns; `*` is not a pattern
pub fn compile_keywords(keywords: &[String]) -> Vec<Regex> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && *k != "*")
        .filter_map(|keyword| {
            let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
            let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
            Regex::new(&pattern)
                .map_err(|e| ::log::warn!("Ignoring keyword '{}': {}", keyword, e))
                .ok()
        })
        .collect()
}

/// Whether a keyword appears in `link`, reading hyphens as spaces
pub fn link_matches(link: &str, patterns: &[Regex]) -> bool {
    let readable = link.replace('-', " ").to_lowercase();
    patterns.iter().any(|p| p.is_match(&readable))
}

/// Links of `source` worth enqueueing, in feed order
pub fn select_links(source: &FeedSource, links: &[String], global: &[Regex]) -> Vec<String> {
    if source.takes_all() {
        return links.iter().take(MAX_ARTICLES_PER_SOURCE).cloned().collect();
    }

    let mut patterns = compile_keywords(&source.keywords);
    patterns.extend(global.iter().cloned());

    links
        .iter()
        .filter(|link| link_matches(link, &patterns))
        .cloned()
        .collect()
}

// ============================================================================
// FEED READING
// ============================================================================

pub trait FeedReader: Send + Sync {
    /// Entry links of the feed at `url`, newest first as published
    fn entry_links(&self, url: &str) -> QueueResult<Vec<String>>;
}

/// Reads feeds over HTTP with a blocking client
pub struct HttpFeedReader {
    client: reqwest::blocking::Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("readcast/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }
}

impl Default for HttpFeedReader {
    fn default() -> Self {
        Self::new(Duration::from_secs(12))
    }
}

impl FeedReader for HttpFeedReader {
    fn entry_links(&self, url: &str) -> QueueResult<Vec<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| QueueError::Feed(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Feed(format!("{} returned HTTP {}", url, status)));
        }
        let bytes = response
            .bytes()
            .map_err(|e| QueueError::Feed(format!("reading {} failed: {}", url, e)))?;

        parse_feed_links(&bytes)
    }
}

/// Entry links of an RSS or Atom document
pub fn parse_feed_links(bytes: &[u8]) -> QueueResult<Vec<String>> {
    let feed = feed_rs::parser::parse(Cursor::new(bytes)).map_err(|e| QueueError::Feed(format!("parse failed: {}", e)))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .links
                .into_iter()
                .map(|link| link.href)
                .find(|href| href.starts_with("http"))
                .or_else(|| Some(entry.id).filter(|id| id.starts_with("http")))
        })
        .collect())
}

// ============================================================================
// SCHEDULER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSchedule {
    /// Fixed local times every day
    Daily(Vec<NaiveTime>),
    /// Fixed period
    Every(Duration),
}

impl Default for FeedSchedule {
    fn default() -> Self {
        FeedSchedule::Daily(
            DAILY_FETCH_TIMES
                .iter()
                .filter_map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0))
                .collect(),
        )
    }
}

impl FeedSchedule {
    /// Every `minutes`, or the daily times when `minutes` is zero or unset
    pub fn from_interval_minutes(minutes: Option<u64>) -> Self {
        match minutes {
            Some(m) if m > 0 => FeedSchedule::Every(Duration::from_secs(m * 60)),
            _ => FeedSchedule::default(),
        }
    }

    /// Time to wait from `now` until the next run
    pub fn next_delay<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        match self {
            FeedSchedule::Every(period) => *period,
            FeedSchedule::Daily(times) => {
                let now = now.naive_local();
                let today = now.date();
                let next = times
                    .iter()
                    .map(|t| today.and_time(*t))
                    .filter(|at| *at > now)
                    .min()
                    .or_else(|| {
                        let tomorrow = today.succ_opt()?;
                        times.iter().map(|t| tomorrow.and_time(*t)).min()
                    });

                next.and_then(|at| (at - now).to_std().ok())
                    .unwrap_or(Duration::from_secs(24 * 60 * 60))
            }
        }
    }
}

pub struct FeedScheduler {
    sources_path: PathBuf,
    store: Arc<TaskStore>,
    history: Arc<HistoryStore>,
    reader: Arc<dyn FeedReader>,
    tts_engine: String,
}

impl FeedScheduler {
    pub fn new(
        sources_path: impl Into<PathBuf>,
        store: Arc<TaskStore>,
        history: Arc<HistoryStore>,
        reader: Arc<dyn FeedReader>,
        tts_engine: impl Into<String>,
    ) -> Self {
        Self {
            sources_path: sources_path.into(),
            store,
            history,
            reader,
            tts_engine: tts_engine.into(),
        }
    }

    /// Fetch every source once; returns how many tasks were enqueued
    pub fn run_once(&self) -> usize {
        let config = SourcesConfig::load(&self.sources_path);
        let global = compile_keywords(&config.global_keywords);

        let mut pending: Vec<String> = self
            .store
            .drain_all()
            .into_iter()
            .filter_map(|r| r.content)
            .collect();
        let mut added = 0;

        for source in &config.sources {
            let links = match self.reader.entry_links(&source.url) {
                Ok(links) => links,
                Err(e) => {
                    ::log::error!("Failed to fetch feed {}: {}", source.url, e);
                    continue;
                }
            };
            ::log::info!("Found {} entries in {}", links.len(), source.url);

            let mut added_here = 0;
            for link in select_links(source, &links, &global) {
                if pending.contains(&link) || self.history.contains(&link) {
                    ::log::debug!("Already known: {}", link);
                    continue;
                }
                match self
                    .store
                    .append(TaskRecord::new(InputType::Url, link.clone(), self.tts_engine.clone()))
                {
                    Ok(()) => {
                        pending.push(link);
                        added_here += 1;
                    }
                    Err(e) => ::log::error!("Failed to enqueue {}: {}", link, e),
                }
            }

            ::log::info!("Added {} articles from {}", added_here, source.url);
            added += added_here;
        }

        added
    }
}

/// Runs the scheduler on its own thread until stopped
pub struct FeedSchedulerHandle {
    worker_handle: Option<thread::JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

impl FeedSchedulerHandle {
    pub fn spawn(scheduler: FeedScheduler, schedule: FeedSchedule) -> QueueResult<Self> {
        let (stop_tx, stop_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("feed-scheduler".to_string())
            .spawn(move || {
                loop {
                    let delay = schedule.next_delay(&Local::now());
                    ::log::info!("Next feed fetch in {} min", delay.as_secs() / 60);

                    match stop_rx.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {
                            let added = scheduler.run_once();
                            ::log::info!("Feed fetch finished, {} new tasks", added);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                ::log::info!("Feed scheduler: exiting");
            })
            .map_err(QueueError::Io)?;

        Ok(Self {
            worker_handle: Some(handle),
            stop_tx: Some(stop_tx),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FeedSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Example</title>
<item><title>One</title><link>https://news.example.com/rust-async-runtime-released</link></item>
<item><title>Two</title><link>https://news.example.com/gardening-tips</link></item>
</channel></rss>"#;

    struct StaticReader {
        feeds: HashMap<String, Vec<String>>,
    }

    impl FeedReader for StaticReader {
        fn entry_links(&self, url: &str) -> QueueResult<Vec<String>> {
            self.feeds
                .get(url)
                .cloned()
                .ok_or_else(|| QueueError::Feed(format!("unknown feed {}", url)))
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_rss_links() {
        let links = parse_feed_links(RSS.as_bytes()).unwrap();
        assert_eq!(
            links,
            vec![
                "https://news.example.com/rust-async-runtime-released",
                "https://news.example.com/gardening-tips",
            ]
        );
        assert!(parse_feed_links(b"not a feed").is_err());
    }

    #[test]
    fn test_keyword_matching() {
        let patterns = compile_keywords(&keywords(&["Async Runtime", "*", "  "]));
        assert_eq!(patterns.len(), 1);

        assert!(link_matches("https://x.com/new-async-runtime-out", &patterns));
        assert!(!link_matches("https://x.com/asyncruntime", &patterns));

        let word = compile_keywords(&keywords(&["ai"]));
        assert!(link_matches("https://x.com/2024/ai-news", &word));
        assert!(!link_matches("https://x.com/said-hello", &word));
    }

    #[test]
    fn test_take_all_is_capped() {
        let source = FeedSource {
            url: "feed".into(),
            keywords: keywords(&["*"]),
        };
        let links: Vec<String> = (0..25).map(|i| format!("https://x.com/{}", i)).collect();

        let selected = select_links(&source, &links, &[]);
        assert_eq!(selected.len(), MAX_ARTICLES_PER_SOURCE);
        assert_eq!(selected[0], "https://x.com/0");
    }

    #[test]
    fn test_run_once_enqueues_new_matches_only() {
        let dir = tempfile::tempdir().unwrap();
        let sources = SourcesConfig {
            global_keywords: keywords(&["rust"]),
            sources: vec![
                FeedSource {
                    url: "feed-a".into(),
                    keywords: keywords(&["gardening"]),
                },
                FeedSource {
                    url: "feed-missing".into(),
                    keywords: keywords(&["*"]),
                },
            ],
        };
        let sources_path = dir.path().join("sources.json");
        std::fs::write(&sources_path, serde_json::to_string(&sources).unwrap()).unwrap();

        let links = keywords(&[
            "https://a.com/rust-news",
            "https://a.com/gardening-tips",
            "https://a.com/cooking",
            "https://a.com/old-rust-story",
        ]);
        let reader = StaticReader {
            feeds: HashMap::from([("feed-a".to_string(), links)]),
        };

        let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
        let history = Arc::new(HistoryStore::new(dir.path().join("history.json")));
        history.record("https://a.com/old-rust-story").unwrap();

        let scheduler = FeedScheduler::new(&sources_path, store.clone(), history, Arc::new(reader), "kokoro");

        assert_eq!(scheduler.run_once(), 2);
        assert_eq!(scheduler.run_once(), 0);

        let queued: Vec<_> = store.drain_all().into_iter().filter_map(|r| r.content).collect();
        assert_eq!(queued, vec!["https://a.com/rust-news", "https://a.com/gardening-tips"]);
        assert_eq!(store.drain_all()[0].tts_engine.as_deref(), Some("kokoro"));
    }

    #[test]
    fn test_missing_sources_file_writes_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");

        assert_eq!(SourcesConfig::load(&path), SourcesConfig::default());

        let written: SourcesConfig = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, SourcesConfig::sample());
    }

    #[test]
    fn test_daily_schedule_delay() {
        let schedule = FeedSchedule::default();
        let at = |h, m| Local.with_ymd_and_hms(2024, 6, 1, h, m, 0).single().unwrap();

        assert_eq!(schedule.next_delay(&at(4, 30)), Duration::from_secs(30 * 60));
        assert_eq!(schedule.next_delay(&at(5, 0)), Duration::from_secs(7 * 3600));
        assert_eq!(schedule.next_delay(&at(20, 0)), Duration::from_secs(4 * 3600));

        let every = FeedSchedule::from_interval_minutes(Some(15));
        assert_eq!(every.next_delay(&at(1, 0)), Duration::from_secs(900));
        assert_eq!(FeedSchedule::from_interval_minutes(Some(0)), FeedSchedule::default());
    }
}
