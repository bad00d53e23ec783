//! Wire types for OpenAI-compatible chat and image endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a chat completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

impl<'a> ChatRequest<'a> {
    /// Single user turn with plain text content
    pub fn text(model: &'a str, content: &'a str) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text(content),
            }],
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }

    /// Single user turn carrying a prompt and an image
    pub fn vision(model: &'a str, prompt: &'a str, image_url: &'a str) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ]),
            }],
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl<'a> {
    pub url: &'a str,
}

/// Chat completion response fields we read
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    /// Legacy completions field
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// `choices[0].message.content`, else `choices[0].text`
    pub fn into_content(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        choice
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .or(choice.text.filter(|t| !t.is_empty()))
    }
}

/// Body of an image generation request
#[derive(Debug, Serialize)]
pub struct ImageRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub n: u32,
    pub size: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
pub struct ImageData {
    #[serde(default)]
    pub url: Option<String>,
}

/// Provider error code from an error body.
///
/// Looks at `detail.error.code`, `error.code` and `code`, in that order.
pub fn error_code(body: &Value) -> Option<&str> {
    body.pointer("/detail/error/code")
        .or_else(|| body.pointer("/error/code"))
        .or_else(|| body.get("code"))
        .and_then(Value::as_str)
}

/// Best human-readable message in an error body
pub fn error_message(raw: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();
    let from_json = parsed.as_ref().and_then(|body| {
        body.pointer("/detail/error/message")
            .or_else(|| body.pointer("/error/message"))
            .or_else(|| body.get("message"))
            .or_else(|| body.get("detail").filter(|d| d.is_string()))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            "empty response body".to_string()
        } else {
            trimmed.chars().take(200).collect()
        }
    })
}

/// Whether an error body says the model is off-plan
pub fn is_access_denied(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(error_code)
        .is_some_and(|code| code == "model_access_denied")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_shape() {
        let body = serde_json::to_value(ChatRequest::text("m", "hi").with_sampling(2000, 0.7)).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_vision_request_shape() {
        let body =
            serde_json::to_value(ChatRequest::vision("v", "describe", "data:image/png;base64,AA"))
                .unwrap();
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0], json!({"type": "text", "text": "describe"}));
        assert_eq!(
            parts[1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AA"}})
        );
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_content_fallback_to_text() {
        let resp: ChatResponse =
            serde_json::from_value(json!({"choices": [{"text": "legacy"}]})).unwrap();
        assert_eq!(resp.into_content().as_deref(), Some("legacy"));

        let resp: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(resp.into_content().is_none());
    }

    #[test]
    fn test_error_code_locations() {
        assert!(is_access_denied(r#"{"detail":{"error":{"code":"model_access_denied"}}}"#));
        assert!(is_access_denied(r#"{"error":{"code":"model_access_denied"}}"#));
        assert!(is_access_denied(r#"{"code":"model_access_denied"}"#));
        assert!(!is_access_denied(r#"{"error":{"code":"rate_limited"}}"#));
        assert!(!is_access_denied("Forbidden"));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message(r#"{"detail":"nope"}"#), "nope");
        assert_eq!(error_message("plain text"), "plain text");
        assert_eq!(error_message(""), "empty response body");
    }
}
