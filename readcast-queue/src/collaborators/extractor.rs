use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client as HttpClient;
use scraper::{ElementRef, Html, Node, Selector};

use super::{Article, ArticleExtractor};
use crate::error::CollaboratorError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; readcast/0.1)";

/// Elements whose text is never read aloud
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
];
/// Elements read as one paragraph each
const BLOCKS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote"];
/// Elements that do not break a run of text
const INLINE: &[&str] = &[
    "a", "abbr", "b", "cite", "code", "em", "i", "mark", "q", "s", "small", "span", "strong", "sub", "sup",
    "time", "u",
];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

// ============================================================================
// HTTP EXTRACTOR
// ============================================================================

/// Fetches a page and keeps its main text
pub struct HttpArticleExtractor {
    client: HttpClient,
}

impl HttpArticleExtractor {
    pub fn new(timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { client }
    }
}

impl Default for HttpArticleExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ArticleExtractor for HttpArticleExtractor {
    async fn extract_text(&self, url: &str) -> Result<Article, CollaboratorError> {
        if url.to_ascii_lowercase().split('?').next().map_or(false, |p| p.ends_with(".pdf")) {
            return Err(CollaboratorError::Unsupported("application/pdf".to_string()));
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        if !content_type.contains("html") && !content_type.starts_with("text/") {
            return Err(CollaboratorError::Unsupported(content_type));
        }

        let html = response.text().await?;
        let article = extract_article(&html).ok_or_else(|| CollaboratorError::EmptyArticle(url.to_string()))?;

        ::log::info!(
            "Extracted {} chars from {} ({})",
            article.body.len(),
            url,
            article.title.as_deref().unwrap_or("untitled")
        );
        Ok(article)
    }
}

// ============================================================================
// HTML TO TEXT
// ============================================================================

/// Main text and title of an HTML page, or None if no text remains
///
/// The outermost `<article>` is read when present, otherwise `<body>`.
pub fn extract_article(html: &str) -> Option<Article> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let scope = document
        .select(&ARTICLE)
        .next()
        .or_else(|| document.select(&BODY).next())
        .unwrap_or_else(|| document.root_element());

    let mut paragraphs = Vec::new();
    collect_blocks(scope, &mut paragraphs);

    let body = if paragraphs.is_empty() {
        visible_text(scope)
    } else {
        paragraphs.join("\n\n")
    };

    if body.is_empty() {
        None
    } else {
        Some(Article { body, title })
    }
}

fn is_one_of(element: ElementRef<'_>, names: &[&str]) -> bool {
    names.contains(&element.value().name())
}

/// Text of every paragraph-level element below `element`, outside boilerplate
fn collect_blocks(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children().filter_map(ElementRef::wrap) {
        if is_one_of(child, BOILERPLATE) {
            continue;
        }
        if is_one_of(child, BLOCKS) {
            let text = visible_text(child);
            if !text.is_empty() {
                out.push(text);
            }
        } else {
            collect_blocks(child, out);
        }
    }
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    collapse_whitespace(&raw)
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_one_of(child, BOILERPLATE) {
                    continue;
                }
                push_text(child, out);
                if !is_one_of(child, INLINE) {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
