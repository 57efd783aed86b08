use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::ScriptWriter;
use crate::error::CollaboratorError;

/// Longest text excerpt sent when asking for a title
const TITLE_EXCERPT_CHARS: usize = 2000;

/// OpenAI-compatible chat endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

// ============================================================================
// PROMPTS
// ============================================================================

fn podcast_prompt(text: &str) -> String {
    format!(
        "Using the text highlighted between ###, generate a detailed and engaging podcast \
         transcript between two speakers, a man and a woman. The conversation should flow \
         naturally and explore the content of the text. Include filler words like \"um\" and \
         \"you know\" so it sounds human. Start every turn with the speaker tag \"speaker1:\" or \
         \"speaker2:\". Do not include stage directions or sound effects. No names are used in \
         the dialogue. Output only the transcript.\n###\n{}\n###",
        text
    )
}

fn summary_prompt(text: &str) -> String {
    format!(
        "Return a concise summary for the text highlighted between ###, without referencing the \
         text or mentioning 'in the text' or similar phrases. Keep the tone and perspective of \
         the original text.\n###\n{}\n###",
        text
    )
}

fn title_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(TITLE_EXCERPT_CHARS).collect();
    format!(
        "Create a 3-word title for the text highlighted between ###. Output only the 3-word \
         title and nothing else!\n###\n{}\n###",
        excerpt
    )
}

// ============================================================================
// CHAT CLIENT
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// ScriptWriter backed by `/chat/completions`
pub struct OpenAiChatWriter {
    config: LlmConfig,
    client: HttpClient,
}

impl OpenAiChatWriter {
    pub fn new(config: LlmConfig) -> Self {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { config, client }
    }

    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            ::log::error!("LLM request failed with {}: {}", status, body);
            return Err(CollaboratorError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| strip_code_fence(&c))
            .filter(|c| !c.is_empty())
            .ok_or(CollaboratorError::EmptyResponse)
    }
}

#[async_trait]
impl ScriptWriter for OpenAiChatWriter {
    async fn generate_podcast_script(&self, article_text: &str) -> Result<String, CollaboratorError> {
        ::log::info!("Requesting podcast script from {}", self.config.model);
        self.complete(&podcast_prompt(article_text)).await
    }

    async fn summarize(&self, text: &str) -> Result<String, CollaboratorError> {
        ::log::info!("Requesting summary from {}", self.config.model);
        self.complete(&summary_prompt(text)).await
    }

    async fn generate_title(&self, text: &str) -> Result<String, CollaboratorError> {
        let title = self.complete(&title_prompt(text)).await?;
        Ok(clean_title(&title))
    }
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map_or("", |(_, body)| body);
            rest.trim_end().trim_end_matches("```").trim().to_string()
        }
        None => trimmed.to_string(),
    }
}

fn clean_title(title: &str) -> String {
    let line = title.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    line.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '#')
        .trim()
        .to_string()
}
