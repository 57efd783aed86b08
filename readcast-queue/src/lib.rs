//! Readcast Queue - Persisted task queue and the worker that drains it
//!
//! This crate provides:
//! - A JSON-backed task store with per-task acknowledgment
//! - History of processed URLs
//! - The task processor and its background thread
//! - Article extraction and LLM collaborators
//! - Output naming and the feed scheduler

pub mod collaborators;
pub mod error;
pub mod feeds;
pub mod history;
mod json_file;
pub mod output;
pub mod processor;
pub mod task;
pub mod task_store;

pub use error::{CollaboratorError, QueueError, QueueResult};

pub use collaborators::{
    extract_article, Article, ArticleExtractor, HttpArticleExtractor, LlmConfig, OpenAiChatWriter, ScriptWriter,
};
pub use feeds::{
    FeedReader, FeedSchedule, FeedScheduler, FeedSchedulerHandle, FeedSource, HttpFeedReader, SourcesConfig,
};
pub use history::HistoryStore;
pub use output::{write_markdown, OutputLayout};
pub use processor::{
    Completed, ProcessorConfig, ProcessorHandle, SkipReason, SweepReport, TaskOutcome, TaskProcessor, TaskReport,
};
pub use task::{InputType, Task, TaskMode, TaskRecord};
pub use task_store::TaskStore;
