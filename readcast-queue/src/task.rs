//! Task records as persisted in the queue file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a task's `content` holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Url,
    Text,
    Podcast,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Url => "url",
            InputType::Text => "text",
            InputType::Podcast => "podcast",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "url" => Some(InputType::Url),
            "text" => Some(InputType::Text),
            "podcast" => Some(InputType::Podcast),
            _ => None,
        }
    }
}

/// How url and text tasks are read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Read the whole text
    #[default]
    Full,
    /// Summarize first, then read the summary
    Tldr,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Full => "full",
            TaskMode::Tldr => "tldr",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Some(TaskMode::Full),
            "tldr" => Some(TaskMode::Tldr),
            _ => None,
        }
    }
}

/// One entry of the queue file, exactly as stored
///
/// Every field is optional so that hand-edited or older entries still load;
/// `validate` decides whether the entry can be processed. Unknown fields are
/// kept so that rewriting the file does not lose them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tts_engine: Option<String>,
    /// Mode for url/text tasks
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    pub fn new(input_type: InputType, content: impl Into<String>, tts_engine: impl Into<String>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            input_type: Some(input_type.as_str().to_string()),
            content: Some(content.into()),
            tts_engine: Some(tts_engine.into()),
            task: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            extra: Map::new(),
        }
    }

    pub fn with_mode(mut self, mode: TaskMode) -> Self {
        self.task = Some(mode.as_str().to_string());
        self
    }

    /// Short description for log lines
    pub fn label(&self) -> String {
        let content = self.content.as_deref().unwrap_or("");
        let preview: String = content.chars().take(60).collect();
        let ellipsis = if content.chars().count() > 60 { "..." } else { "" };
        format!(
            "{} '{}{}'",
            self.input_type.as_deref().unwrap_or("<untyped>"),
            preview,
            ellipsis
        )
    }

    /// Check required fields and build a processable task
    pub fn validate(&self) -> Result<Task, String> {
        let input_type = self
            .input_type
            .as_deref()
            .ok_or_else(|| "missing field 'type'".to_string())?;
        let input_type =
            InputType::parse(input_type).ok_or_else(|| format!("unknown task type '{}'", input_type))?;

        let content = self
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "missing field 'content'".to_string())?;

        let tts_engine = self
            .tts_engine
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| "missing field 'tts_engine'".to_string())?;

        let mode = match self.task.as_deref().filter(|t| !t.trim().is_empty()) {
            None => TaskMode::Full,
            Some(mode) => TaskMode::parse(mode).ok_or_else(|| format!("unknown task mode '{}'", mode))?,
        };

        Ok(Task {
            id: self.id.clone(),
            input_type,
            content: content.to_string(),
            tts_engine: tts_engine.to_string(),
            mode,
        })
    }
}

/// A validated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: Option<String>,
    pub input_type: InputType,
    pub content: String,
    pub tts_engine: String,
    pub mode: TaskMode,
}

/// Whether `content` should be fetched rather than read as-is
pub fn is_http_url(content: &str) -> bool {
    let content = content.trim();
    (content.starts_with("http://") || content.starts_with("https://"))
        && !content.contains(char::is_whitespace)
}
