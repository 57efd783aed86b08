//! Task Processor - Background loop that turns queued tasks into audio
//!
//! Each sweep takes the oldest record, handles it, acknowledges it, and
//! repeats until the queue is empty. A task never aborts the sweep: its
//! outcome is `Completed` or a `SkipReason`, and it is removed either way.
//! A record whose removal fails is remembered and its removal retried before
//! anything else is dequeued, so a handled record is never run twice by the
//! same process.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use readcast_cast::{
    Assembly, AudioMetadata, MixerConfig, PodcastGenerator, TtsEngine, TtsRegistry,
};

use crate::collaborators::{ArticleExtractor, ScriptWriter};
use crate::error::{QueueError, QueueResult};
use crate::history::HistoryStore;
use crate::output::{write_markdown, OutputLayout};
use crate::task::{is_http_url, InputType, Task, TaskMode, TaskRecord};
use crate::task_store::TaskStore;

/// Words used for a fallback title when the LLM cannot provide one
const FALLBACK_TITLE_WORDS: usize = 5;

// ============================================================================
// OUTCOMES
// ============================================================================

/// Why a task produced no output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing or unrecognized fields
    Invalid(String),
    /// URL already present in history
    AlreadyProcessed(String),
    /// Extraction, LLM, synthesis or export failed
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Invalid(reason) => write!(f, "invalid task: {}", reason),
            SkipReason::AlreadyProcessed(url) => write!(f, "already processed: {}", url),
            SkipReason::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Artifacts written for a finished task
#[derive(Debug, Clone)]
pub struct Completed {
    pub title: String,
    pub audio_file: PathBuf,
    pub subtitle_file: Option<PathBuf>,
    pub markdown_file: PathBuf,
    pub duration_ms: u64,
}

pub type TaskOutcome = Result<Completed, SkipReason>;

#[derive(Debug)]
pub struct TaskReport {
    pub label: String,
    pub outcome: TaskOutcome,
}

/// Outcomes of one sweep, in processing order
#[derive(Debug, Default)]
pub struct SweepReport {
    pub tasks: Vec<TaskReport>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.tasks.iter().filter(|t| t.outcome.is_ok()).count()
    }

    pub fn skipped(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, Err(SkipReason::Invalid(_)) | Err(SkipReason::AlreadyProcessed(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, Err(SkipReason::Failed(_))))
            .count()
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Sleep between sweeps
    pub poll_interval: Duration,
    /// Narration voice per engine name; random when absent
    pub default_voices: HashMap<String, String>,
    /// Export settings; metadata is filled in per task
    pub mixer: MixerConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            default_voices: HashMap::new(),
            mixer: MixerConfig::default(),
        }
    }
}

pub struct TaskProcessor {
    store: Arc<TaskStore>,
    history: Arc<HistoryStore>,
    engines: Arc<TtsRegistry>,
    extractor: Arc<dyn ArticleExtractor>,
    writer: Arc<dyn ScriptWriter>,
    generator: PodcastGenerator,
    layout: OutputLayout,
    config: ProcessorConfig,
    /// Handled records still present in the store
    unacknowledged: Mutex<Vec<TaskRecord>>,
}

impl TaskProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        history: Arc<HistoryStore>,
        engines: Arc<TtsRegistry>,
        extractor: Arc<dyn ArticleExtractor>,
        writer: Arc<dyn ScriptWriter>,
        generator: PodcastGenerator,
        layout: OutputLayout,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            history,
            engines,
            extractor,
            writer,
            generator,
            layout,
            config,
            unacknowledged: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Handle every queued task, oldest first
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_until(|| false).await
    }

    /// Like `sweep`, but checks `should_stop` before each task
    pub async fn sweep_until(&self, should_stop: impl Fn() -> bool) -> SweepReport {
        let mut report = SweepReport::default();

        loop {
            if !self.retry_acknowledgements() || should_stop() {
                break;
            }
            let Some(record) = self.store.dequeue_one() else {
                break;
            };

            let label = record.label();
            let outcome = self.handle(&record).await;

            match &outcome {
                Ok(done) => ::log::info!(
                    "Completed {} -> {} ({} ms)",
                    label,
                    done.audio_file.display(),
                    done.duration_ms
                ),
                Err(SkipReason::Failed(reason)) => ::log::error!("Task {} failed: {}", label, reason),
                Err(reason) => ::log::info!("Skipped {}: {}", label, reason),
            }

            report.tasks.push(TaskReport { label, outcome });

            if let Err(e) = self.store.acknowledge(&record) {
                ::log::error!("Failed to acknowledge {}, ending sweep: {}", record.label(), e);
                self.unacknowledged.lock().push(record);
                break;
            }
        }

        report
    }

    /// Handled records whose removal from the store has not succeeded yet
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged.lock().len()
    }

    /// Remove previously handled records; false while any removal still fails
    fn retry_acknowledgements(&self) -> bool {
        let mut pending = self.unacknowledged.lock();
        pending.retain(|record| match self.store.acknowledge(record) {
            Ok(_) => false,
            Err(e) => {
                ::log::warn!("Still cannot acknowledge {}: {}", record.label(), e);
                true
            }
        });
        pending.is_empty()
    }

    /// Process one record without touching the queue
    pub async fn handle(&self, record: &TaskRecord) -> TaskOutcome {
        let task = record.validate().map_err(SkipReason::Invalid)?;

        if task.input_type == InputType::Url && self.history.contains(&task.content) {
            return Err(SkipReason::AlreadyProcessed(task.content));
        }

        let engine = self
            .engines
            .resolve(&task.tts_engine)
            .ok_or_else(|| SkipReason::Failed(format!("no TTS engine available for '{}'", task.tts_engine)))?;

        ::log::info!(
            "Processing {} with {} ({})",
            record.label(),
            engine.engine_name(),
            task.mode.as_str()
        );

        engine
            .load()
            .await
            .map_err(|e| SkipReason::Failed(format!("loading {}: {}", engine.engine_name(), e)))?;

        let result = self.run(&task, engine.as_ref()).await;

        if let Err(e) = engine.unload().await {
            ::log::warn!("Failed to unload {}: {}", engine.engine_name(), e);
        }

        let completed = result.map_err(|e| SkipReason::Failed(e.to_string()))?;

        if task.input_type == InputType::Url {
            if let Err(e) = self.history.record(&task.content) {
                ::log::warn!("Failed to record {} in history: {}", task.content, e);
            }
        }

        Ok(completed)
    }

    async fn run(&self, task: &Task, engine: &dyn TtsEngine) -> QueueResult<Completed> {
        match task.input_type {
            InputType::Url => {
                let article = self.extractor.extract_text(&task.content).await?;
                let text = self.apply_mode(task.mode, article.body).await?;
                let title = match article.title {
                    Some(title) => title,
                    None => self.title_for(&text).await,
                };
                self.narrate(engine, &title, &text, Some(&task.content)).await
            }
            InputType::Text => {
                let text = self.apply_mode(task.mode, task.content.clone()).await?;
                let title = self.title_for(&text).await;
                self.narrate(engine, &title, &text, None).await
            }
            InputType::Podcast => {
                let (source_text, source) = if is_http_url(&task.content) {
                    let article = self.extractor.extract_text(&task.content).await?;
                    (article.body, Some(task.content.as_str()))
                } else {
                    (task.content.clone(), None)
                };

                let script = self.writer.generate_podcast_script(&source_text).await?;
                let title = self.title_for(&source_text).await;

                let assembly = self
                    .generator
                    .assemble_podcast(engine, &script, None, None)
                    .await?;
                self.export(assembly, &title, &script, source)
            }
        }
    }

    async fn apply_mode(&self, mode: TaskMode, text: String) -> QueueResult<String> {
        match mode {
            TaskMode::Full => Ok(text),
            TaskMode::Tldr => Ok(self.writer.summarize(&text).await?),
        }
    }

    async fn title_for(&self, text: &str) -> String {
        match self.writer.generate_title(text).await {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => fallback_title(text),
            Err(e) => {
                ::log::warn!("Title generation failed, using text excerpt: {}", e);
                fallback_title(text)
            }
        }
    }

    async fn narrate(
        &self,
        engine: &dyn TtsEngine,
        title: &str,
        text: &str,
        source: Option<&str>,
    ) -> QueueResult<Completed> {
        let voice = self.config.default_voices.get(engine.engine_name()).map(String::as_str);
        let assembly = self.generator.assemble_narration(engine, text, voice).await?;
        self.export(assembly, title, text, source)
    }

    fn export(&self, assembly: Assembly, title: &str, text: &str, source: Option<&str>) -> QueueResult<Completed> {
        if assembly.segments_failed > 0 {
            ::log::warn!(
                "{} of {} segments failed for '{}'",
                assembly.segments_failed,
                assembly.segments_total,
                title
            );
        }

        let today = chrono::Local::now().date_naive();
        let base = self.layout.next_base(today)?;

        let mut mixer = self.config.mixer.clone();
        mixer.metadata = AudioMetadata::episode(title, &today.format("%Y-%m-%d").to_string());

        let exported = assembly.export(&base, &mixer)?;
        let markdown_file = write_markdown(&base, title, text, source)?;

        Ok(Completed {
            title: title.to_string(),
            audio_file: exported.audio_file,
            subtitle_file: exported.subtitle_file,
            markdown_file,
            duration_ms: exported.duration_ms,
        })
    }
}

fn fallback_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(FALLBACK_TITLE_WORDS).collect();
    if words.is_empty() {
        "Untitled".to_string()
    } else {
        words.join(" ")
    }
}

// ============================================================================
// WORKER THREAD
// ============================================================================

/// Runs sweeps on a dedicated thread until stopped
///
/// Stopping lets the task in progress finish; the stop signal is seen
/// between tasks.
pub struct ProcessorHandle {
    worker_handle: Option<thread::JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

impl ProcessorHandle {
    pub fn spawn(processor: TaskProcessor) -> QueueResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (stop_tx, stop_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("task-processor".to_string())
            .spawn(move || {
                let interval = processor.poll_interval();
                ::log::info!("Task processor started (polling every {:?})", interval);

                loop {
                    if stop_rx.try_recv().is_ok() {
                        break;
                    }

                    let report = runtime.block_on(processor.sweep_until(|| !stop_rx.is_empty()));
                    if !report.is_empty() {
                        ::log::info!(
                            "Sweep done: {} completed, {} skipped, {} failed",
                            report.completed(),
                            report.skipped(),
                            report.failed()
                        );
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                ::log::info!("Task processor: exiting");
            })
            .map_err(QueueError::Io)?;

        Ok(Self {
            worker_handle: Some(handle),
            stop_tx: Some(stop_tx),
        })
    }

    /// Signal the worker and wait for it to exit
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

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    mod processor_test;
}
