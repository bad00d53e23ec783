//! Web search augmentation
//!
//! A keyword heuristic decides whether a message is about something current
//! enough to be worth a lookup. Lookups go to a DuckDuckGo Instant Answer
//! compatible endpoint; whatever snippets come back are folded into the
//! prompt ahead of the completion request. Search failures are logged and
//! otherwise ignored.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::{Error, Result};

/// Returned by [`format_results`] when the answer carried nothing usable
pub const NO_RESULTS: &str = "No specific information found from web search.";

const TIME_SENSITIVE: &[&str] = &[
    "current",
    "recent",
    "latest",
    "today",
    "yesterday",
    "news",
    "weather",
    "update",
    "2024",
    "2025",
    "now",
    "current events",
    "breaking",
    "trending",
    "live",
    "score",
    "results",
];

const CURRENT_EVENTS: &[&str] = &[
    "president",
    "election",
    "sports",
    "game",
    "match",
    "covid",
    "pandemic",
    "stock",
    "market",
    "price",
    "crypto",
    "bitcoin",
];

const QUESTION_PREFIXES: &[&str] = &["what is", "who is", "when is", "where is", "how to"];

fn year_pattern() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b\d{4}\b").expect("year pattern is valid"))
}

/// Whether `message` looks like it needs fresh information.
///
/// Matches are plain substrings of the lower-cased message, so "now" also
/// fires inside "know".
pub fn needs_search(message: &str) -> bool {
    let lower = message.to_lowercase();
    TIME_SENSITIVE
        .iter()
        .chain(CURRENT_EVENTS)
        .chain(QUESTION_PREFIXES)
        .any(|keyword| lower.contains(keyword))
        || year_pattern().is_match(message)
}

/// Instant Answer response fields we read
#[derive(Debug, Default, Deserialize)]
pub struct InstantAnswer {
    #[serde(rename = "Heading", default)]
    pub heading: Option<String>,
    #[serde(rename = "Abstract", default)]
    pub summary: Option<String>,
    #[serde(rename = "AbstractText", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "Definition", default)]
    pub definition: Option<String>,
    #[serde(rename = "DefinitionText", default)]
    pub definition_text: Option<String>,
    #[serde(rename = "RelatedTopics", default)]
    pub related_topics: Vec<Topic>,
    #[serde(rename = "Results", default)]
    pub results: Vec<Topic>,
}

/// One related topic or result entry
#[derive(Debug, Default, Deserialize)]
pub struct Topic {
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Fold an answer into one markdown-ish block, or [`NO_RESULTS`].
///
/// Keeps the abstract, the definition, up to three related topics and up
/// to two results.
pub fn format_results(answer: &InstantAnswer) -> String {
    let mut out = String::new();

    if let (Some(_), Some(text)) = (present(&answer.summary), present(&answer.abstract_text)) {
        let heading = present(&answer.heading).unwrap_or("Information");
        out.push_str(&format!("**{}**: {}\n\n", heading, text));
    }

    if let (Some(_), Some(text)) = (
        present(&answer.definition),
        present(&answer.definition_text),
    ) {
        out.push_str(&format!("**Definition**: {}\n\n", text));
    }

    if !answer.related_topics.is_empty() {
        out.push_str("**Related Information**:\n");
        for text in answer.related_topics.iter().take(3).filter_map(|t| present(&t.text)) {
            out.push_str(&format!("• {}\n", text));
        }
        out.push('\n');
    }

    if !answer.results.is_empty() {
        out.push_str("**Additional Details**:\n");
        for text in answer.results.iter().take(2).filter_map(|t| present(&t.text)) {
            out.push_str(&format!("• {}\n", text));
        }
    }

    if out.is_empty() {
        NO_RESULTS.to_string()
    } else {
        out
    }
}

/// Build the prompt sent in place of `message` when snippets were found.
///
/// Returns `None` for the no-results sentinel.
pub fn combine(message: &str, snippets: &str) -> Option<String> {
    if snippets.trim().is_empty() || snippets == NO_RESULTS {
        return None;
    }
    Some(format!(
        "User Question: {}\n\nWeb Search Results: {}\n\nPlease provide a comprehensive answer based on the web search results and your knowledge.",
        message, snippets
    ))
}

/// Fetches and formats search snippets
#[derive(Clone)]
pub struct SearchAugmenter {
    http: reqwest::Client,
    endpoint: String,
}

impl SearchAugmenter {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn needs_search(&self, message: &str) -> bool {
        needs_search(message)
    }

    /// Look up `query` and return formatted snippets.
    ///
    /// Any failure is logged and returns `None`.
    pub async fn augment(&self, query: &str) -> Option<String> {
        match self.fetch(query).await {
            Ok(answer) => Some(format_results(&answer)),
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Web search failed");
                None
            }
        }
    }

    /// The prompt to send for `message`, and whether snippets went into it.
    pub async fn prepare_prompt(&self, message: &str) -> (String, bool) {
        if !self.needs_search(message) {
            return (message.to_string(), false);
        }
        match self.augment(message).await.and_then(|s| combine(message, &s)) {
            Some(prompt) => {
                tracing::debug!("Prompt augmented with web search results");
                (prompt, true)
            }
            None => (message.to_string(), false),
        }
    }

    async fn fetch(&self, query: &str) -> std::result::Result<InstantAnswer, String> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("search API error: {}", status.as_u16()));
        }

        // The service answers with a javascript content type, so decode by hand
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e))?;
        serde_json::from_str(&body).map_err(|e| format!("failed to parse response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_search_scenarios() {
        assert!(needs_search("What's the weather today?"));
        assert!(!needs_search("Summarize this paragraph"));
    }

    #[test]
    fn test_needs_search_keywords() {
        assert!(needs_search("Who is the PRESIDENT of France"));
        assert!(needs_search("covid numbers"));
        assert!(needs_search("COVID numbers"));
        assert!(needs_search("how to bake bread"));
        assert!(needs_search("events of 1969"));
        assert!(!needs_search("Explain recursion with an example"));
        assert!(!needs_search("call 12345 please"));
    }

    #[test]
    fn test_format_results_full() {
        let answer: InstantAnswer = serde_json::from_str(
            r#"{
                "Heading": "Rust",
                "Abstract": "Rust is a language",
                "AbstractText": "Rust is a systems language",
                "Definition": "def",
                "DefinitionText": "A programming language",
                "RelatedTopics": [
                    {"Text": "one"},
                    {"Name": "group", "Topics": []},
                    {"Text": "three"},
                    {"Text": "four"}
                ],
                "Results": [{"Text": "r1"}, {"Text": "r2"}, {"Text": "r3"}]
            }"#,
        )
        .unwrap();

        assert_eq!(
            format_results(&answer),
            "**Rust**: Rust is a systems language\n\n\
             **Definition**: A programming language\n\n\
             **Related Information**:\n• one\n• three\n\n\
             **Additional Details**:\n• r1\n• r2\n"
        );
    }

    #[test]
    fn test_format_results_heading_fallback() {
        let answer = InstantAnswer {
            summary: Some("x".to_string()),
            abstract_text: Some("text".to_string()),
            ..Default::default()
        };
        assert_eq!(format_results(&answer), "**Information**: text\n\n");
    }

    #[test]
    fn test_format_results_empty_is_sentinel() {
        let answer: InstantAnswer =
            serde_json::from_str(r#"{"Heading": "", "Abstract": "", "RelatedTopics": []}"#)
                .unwrap();
        assert_eq!(format_results(&answer), NO_RESULTS);
    }

    #[test]
    fn test_combine() {
        assert!(combine("q", NO_RESULTS).is_none());
        let prompt = combine("What is up?", "**Info**: stuff").unwrap();
        assert!(prompt.starts_with("User Question: What is up?\n\nWeb Search Results: **Info**: stuff"));
        assert!(prompt.ends_with("based on the web search results and your knowledge."));
    }
}
