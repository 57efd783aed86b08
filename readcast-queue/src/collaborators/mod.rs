//! External services a task depends on
//!
//! - `ArticleExtractor`: URL to readable body text and title
//! - `ScriptWriter`: LLM prompts for podcast scripts, summaries and titles

mod extractor;
mod llm;

use async_trait::async_trait;

use crate::error::CollaboratorError;

pub use extractor::{extract_article, HttpArticleExtractor};
pub use llm::{LlmConfig, OpenAiChatWriter};

/// Readable content of a web page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub body: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract_text(&self, url: &str) -> Result<Article, CollaboratorError>;
}

#[async_trait]
pub trait ScriptWriter: Send + Sync {
    /// Two-speaker transcript tagged with `speaker1:` / `speaker2:`
    async fn generate_podcast_script(&self, article_text: &str) -> Result<String, CollaboratorError>;

    async fn summarize(&self, text: &str) -> Result<String, CollaboratorError>;

    /// A title of a few words
    async fn generate_title(&self, text: &str) -> Result<String, CollaboratorError>;
}
