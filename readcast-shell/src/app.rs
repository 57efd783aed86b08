//! Composition root: builds engines, stores and collaborators from settings

use std::sync::Arc;
use std::time::Duration;

use readcast_cast::{
    GeneratorConfig, KokoroTtsEngine, MockTtsEngine, OpenAiTtsEngine, PodcastGenerator, TtsEngine, TtsRegistry,
};
use readcast_queue::{
    FeedScheduler, HistoryStore, HttpArticleExtractor, HttpFeedReader, OpenAiChatWriter, OutputLayout, TaskProcessor,
    TaskStore,
};

use crate::config::Settings;

pub struct App {
    pub settings: Settings,
    pub store: Arc<TaskStore>,
    pub history: Arc<HistoryStore>,
    pub engines: Arc<TtsRegistry>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let store = Arc::new(TaskStore::new(settings.tasks_path()));
        let history = Arc::new(HistoryStore::new(settings.history_path()));
        let engines = Arc::new(build_registry(&settings));

        ::log::info!(
            "Data in {}, output to {}, engines: {}",
            settings.data_dir.display(),
            settings.output_dir.display(),
            engines.names().join(", ")
        );

        Self {
            settings,
            store,
            history,
            engines,
        }
    }

    pub fn processor(&self) -> TaskProcessor {
        let generator = PodcastGenerator::new(GeneratorConfig {
            sample_rate: self.settings.sample_rate,
            work_dir: self.settings.work_dir.clone(),
        });

        TaskProcessor::new(
            self.store.clone(),
            self.history.clone(),
            self.engines.clone(),
            Arc::new(HttpArticleExtractor::new(Duration::from_secs(30))),
            Arc::new(OpenAiChatWriter::new(self.settings.llm.clone())),
            generator,
            OutputLayout::new(&self.settings.output_dir),
            self.settings.processor_config(),
        )
    }

    pub fn feed_scheduler(&self) -> FeedScheduler {
        FeedScheduler::new(
            self.settings.sources_path(),
            self.store.clone(),
            self.history.clone(),
            Arc::new(HttpFeedReader::default()),
            self.settings.default_engine.clone(),
        )
    }
}

/// One instance per engine, shared by every task
pub fn build_registry(settings: &Settings) -> TtsRegistry {
    let mock: Arc<dyn TtsEngine> = Arc::new(MockTtsEngine::new());
    let openai: Arc<dyn TtsEngine> = Arc::new(OpenAiTtsEngine::new(settings.openai.clone()));
    let kokoro: Arc<dyn TtsEngine> = Arc::new(KokoroTtsEngine::new(settings.kokoro.clone()));

    TtsRegistry::new(settings.default_engine.clone())
        .with_engine("mock", mock)
        .with_engine("openai", openai)
        .with_engine("kokoro", kokoro)
}

#[cfg(test)]
mod tests {
    use figment::Figment;

    use super::*;

    #[test]
    fn test_registry_falls_back_to_configured_default() {
        let settings = Settings::from_figment(Figment::from(figment::providers::Serialized::default(
            "default_engine",
            "mock",
        )))
        .unwrap();

        let registry = build_registry(&settings);

        assert_eq!(registry.names(), vec!["kokoro", "mock", "openai"]);
        let engine = registry.resolve("edge_tts").unwrap();
        assert_eq!(engine.engine_name(), "mock");
    }

    #[test]
    fn test_app_paths_follow_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_figment(Figment::from(figment::providers::Serialized::default(
            "data_dir",
            dir.path(),
        )))
        .unwrap();

        let app = App::new(settings);

        assert_eq!(app.store.path(), dir.path().join("tasks.json"));
        assert_eq!(app.history.path(), dir.path().join("history.json"));
    }
}
