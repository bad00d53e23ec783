//! HTTP client for OpenAI-compatible completion endpoints
//!
//! Endpoints come from configuration as an ordered list. Each request starts
//! at the current endpoint (the last one that answered, or the one chosen by
//! [`CompletionClient::probe_endpoints`]) and falls back through the rest in
//! configured order. Clones share the current-endpoint pointer.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use super::error::CompletionError;
use super::request::{
    error_message, is_access_denied, ChatRequest, ChatResponse, ImageRequest, ImageResponse,
};
use crate::config::CompletionConfig;
use crate::error::{Error, Result};

/// Progress of one send through the endpoint list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending,
    RetryingNextEndpoint,
    Success,
    Failed,
}

/// Outcome of probing one endpoint
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub endpoint: String,
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// What kind of chat request is in flight; decides 400/404 handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Text,
    Vision,
}

/// Completion client with endpoint fallback
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoints: Arc<Vec<String>>,
    current: Arc<Mutex<usize>>,
    timeout_secs: u64,
    max_tokens: u32,
    temperature: f32,
}

impl CompletionClient {
    /// Create a client from configuration
    ///
    /// The API key is read from `COLLOQUY_API_KEY` or `[completion] api_key`.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        match config.resolved_api_key() {
            Some(api_key) => {
                let auth_value = format!("Bearer {}", api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth_value)
                        .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
                );
            }
            None => tracing::warn!("No completion API key configured; requests are unauthenticated"),
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints: Arc::new(config.endpoints.clone()),
            current: Arc::new(Mutex::new(0)),
            timeout_secs: config.timeout_secs,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Endpoint the next request starts at
    pub fn current_endpoint(&self) -> Option<&str> {
        let idx = *self.current.lock().unwrap();
        self.endpoints.get(idx).map(String::as_str)
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Send `message` as a single user turn to `model`
    pub async fn complete(
        &self,
        message: &str,
        model: &str,
    ) -> std::result::Result<String, CompletionError> {
        let body =
            ChatRequest::text(model, message).with_sampling(self.max_tokens, self.temperature);
        self.send_chat(&body, model, RequestKind::Text).await
    }

    /// Ask a vision model about an image given as a URL or data URL
    pub async fn complete_vision(
        &self,
        prompt: &str,
        image_url: &str,
        model: &str,
    ) -> std::result::Result<String, CompletionError> {
        let body = ChatRequest::vision(model, prompt, image_url);
        self.send_chat(&body, model, RequestKind::Vision).await
    }

    /// Generate an image and return its URL
    pub async fn generate_image(
        &self,
        endpoint: &str,
        prompt: &str,
        model: &str,
        size: &str,
    ) -> std::result::Result<String, CompletionError> {
        let body = ImageRequest {
            model,
            prompt,
            n: 1,
            size,
        };

        tracing::info!(endpoint, model, "Requesting image generation");
        let (status, text) = self.post(endpoint, &body).await?;

        if !status.is_success() {
            if status == reqwest::StatusCode::FORBIDDEN && is_access_denied(&text) {
                return Err(CompletionError::ModelAccessDenied {
                    model: model.to_string(),
                });
            }
            return Err(CompletionError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: ImageResponse =
            serde_json::from_str(&text).map_err(|e| CompletionError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CompletionError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: "no image URL in response".to_string(),
            })
    }

    /// Health-check every endpoint and start future requests at the first
    /// healthy one. The current endpoint is unchanged if none answer.
    pub async fn probe_endpoints(&self, model: &str) -> Vec<ProbeResult> {
        let body = ChatRequest::text(model, "ping").with_sampling(1, 0.0);
        let mut results = Vec::with_capacity(self.endpoints.len());
        let mut selected = None;

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            let started = Instant::now();
            let outcome = match self.post(endpoint, &body).await {
                Ok((status, _)) if status.is_success() => Ok(()),
                Ok((status, text)) => Err(format!("HTTP {}: {}", status.as_u16(), error_message(&text))),
                Err(e) => Err(e.to_string()),
            };
            let latency = started.elapsed();

            match &outcome {
                Ok(()) => {
                    tracing::info!(endpoint = %endpoint, ?latency, "Endpoint healthy");
                    selected.get_or_insert(idx);
                }
                Err(e) => tracing::warn!(endpoint = %endpoint, error = %e, "Endpoint unhealthy"),
            }

            results.push(ProbeResult {
                endpoint: endpoint.clone(),
                healthy: outcome.is_ok(),
                latency,
                error: outcome.err(),
            });
        }

        if let Some(idx) = selected {
            *self.current.lock().unwrap() = idx;
        }
        results
    }

    /// Current endpoint first, then the others in configured order
    fn candidates(&self) -> Vec<usize> {
        let start = *self.current.lock().unwrap();
        std::iter::once(start)
            .chain((0..self.endpoints.len()).filter(|i| *i != start))
            .filter(|i| *i < self.endpoints.len())
            .collect()
    }

    async fn send_chat(
        &self,
        body: &ChatRequest<'_>,
        model: &str,
        kind: RequestKind,
    ) -> std::result::Result<String, CompletionError> {
        let mut state = SendState::Idle;
        let mut last = None;
        let mut attempted = 0;

        for idx in self.candidates() {
            let endpoint = &self.endpoints[idx];
            transition(&mut state, SendState::Sending, endpoint);
            attempted += 1;

            match self.attempt(endpoint, body, model, kind).await {
                Ok(content) => {
                    *self.current.lock().unwrap() = idx;
                    transition(&mut state, SendState::Success, endpoint);
                    return Ok(content);
                }
                Err(e) if e.is_terminal() => {
                    tracing::warn!(endpoint = %endpoint, model, error = %e, "Request refused");
                    transition(&mut state, SendState::Failed, endpoint);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, model, error = %e, "Endpoint failed");
                    transition(&mut state, SendState::RetryingNextEndpoint, endpoint);
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => {
                transition(&mut state, SendState::Failed, last_endpoint(&last));
                Err(CompletionError::Exhausted {
                    attempted,
                    last: Box::new(last),
                })
            }
            None => Err(CompletionError::NoEndpoints),
        }
    }

    async fn attempt(
        &self,
        endpoint: &str,
        body: &ChatRequest<'_>,
        model: &str,
        kind: RequestKind,
    ) -> std::result::Result<String, CompletionError> {
        let (status, text) = self.post(endpoint, body).await?;

        if status.is_success() {
            let parsed: ChatResponse =
                serde_json::from_str(&text).map_err(|e| CompletionError::InvalidResponse {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })?;
            return parsed
                .into_content()
                .ok_or_else(|| CompletionError::InvalidResponse {
                    endpoint: endpoint.to_string(),
                    message: "no content in choices[0]".to_string(),
                });
        }

        tracing::debug!(endpoint, status = status.as_u16(), body = %text, "Error response");

        if status == reqwest::StatusCode::FORBIDDEN && is_access_denied(&text) {
            return Err(CompletionError::ModelAccessDenied {
                model: model.to_string(),
            });
        }
        if kind == RequestKind::Vision
            && (status == reqwest::StatusCode::BAD_REQUEST
                || status == reqwest::StatusCode::NOT_FOUND)
        {
            return Err(CompletionError::ImagesUnsupported {
                model: model.to_string(),
            });
        }

        Err(CompletionError::Http {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: error_message(&text),
        })
    }

    /// POST a JSON body and read the response as text
    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> std::result::Result<(reqwest::StatusCode, String), CompletionError> {
        let response = self
            .http
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        Ok((status, text))
    }

    fn transport_error(&self, endpoint: &str, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout {
                endpoint: endpoint.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            CompletionError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
        }
    }
}

fn transition(state: &mut SendState, next: SendState, endpoint: &str) {
    tracing::debug!(from = ?*state, to = ?next, endpoint, "Completion state");
    *state = next;
}

fn last_endpoint(err: &CompletionError) -> &str {
    match err {
        CompletionError::Timeout { endpoint, .. }
        | CompletionError::Connect { endpoint, .. }
        | CompletionError::Http { endpoint, .. }
        | CompletionError::InvalidResponse { endpoint, .. } => endpoint,
        _ => "",
    }
}
