//! Completion failure taxonomy and the guidance shown to users.

use thiserror::Error;

const UNREACHABLE_PREFIX: &str =
    "I apologize, but I'm currently unable to connect to the AI service. ";

/// Why a completion, vision or image-generation request failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The client-side timeout fired
    #[error("request to {endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    /// Transport-level failure before any HTTP status arrived
    #[error("cannot connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// Non-2xx response
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Http {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// HTTP 403 carrying `model_access_denied`
    #[error("model {model} is not available on your current plan")]
    ModelAccessDenied { model: String },

    /// The vision request was refused as malformed (HTTP 400/404)
    #[error("model {model} does not support image input")]
    ImagesUnsupported { model: String },

    /// 2xx response without the expected content
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// Every candidate endpoint failed
    #[error("all {attempted} completion endpoints failed; last error: {last}")]
    Exhausted {
        attempted: usize,
        last: Box<CompletionError>,
    },

    #[error("no completion endpoints configured")]
    NoEndpoints,
}

impl CompletionError {
    /// Failures that another endpoint would answer the same way
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CompletionError::ModelAccessDenied { .. } | CompletionError::ImagesUnsupported { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CompletionError::Timeout { .. } => true,
            CompletionError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// The failure that decided the outcome
    pub fn root(&self) -> &CompletionError {
        match self {
            CompletionError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Text shown to the user in place of an assistant reply
    pub fn user_message(&self) -> String {
        match self.root() {
            CompletionError::ModelAccessDenied { model } => format!(
                "The model {} is not available on your current plan. Please select a different model.",
                model
            ),
            CompletionError::ImagesUnsupported { model } => format!(
                "The model {} does not support images. Please select a vision model.",
                model
            ),
            CompletionError::Connect { .. } => format!(
                "{}This appears to be a network connectivity issue. Please check your internet connection.",
                UNREACHABLE_PREFIX
            ),
            CompletionError::Timeout { secs, .. } => format!(
                "{}The request timed out after {} seconds. Please try again.",
                UNREACHABLE_PREFIX, secs
            ),
            CompletionError::Http {
                status, message, ..
            } => {
                let lower = message.to_lowercase();
                let guidance = if *status == 401 || lower.contains("auth") {
                    "There seems to be an authentication issue with the AI service."
                } else if *status == 429 || lower.contains("quota") || lower.contains("limit") {
                    "The AI service quota has been exceeded. Please try again later."
                } else if *status == 500 || *status == 503 {
                    "The AI service is temporarily unavailable. Please try again in a few minutes."
                } else {
                    "Please try again later or contact support if the issue persists."
                };
                format!("{}{}", UNREACHABLE_PREFIX, guidance)
            }
            _ => format!(
                "{}Please try again later or contact support if the issue persists.",
                UNREACHABLE_PREFIX
            ),
        }
    }
}
