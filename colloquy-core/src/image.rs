//! Image upload, analysis and generation.
//!
//! Uploads are checked for an `image/*` type and a size limit, turned into
//! a data URL, shown in the transcript and sent to a vision model. The
//! generation side posts a prompt to a separate endpoint and shows the URL
//! it gets back.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::chat::ChatContext;
use crate::completion::{CompletionClient, CompletionError};
use crate::config::ImageConfig;
use crate::error::{Error, Result};
use crate::models::ModelRegistry;
use crate::render::TypingHandle;
use crate::types::{Message, ModelKind, Role};

/// Largest upload accepted by default (5 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Placeholder shown while a vision model looks at an upload
pub const ANALYZING_LABEL: &str = "Analyzing image...";

/// Shown in place of an analysis that failed
pub const ANALYSIS_FAILED: &str = "Sorry, I encountered an error while analyzing the image.";

/// Check type and size before reading an upload
pub fn validate_upload(mime: &str, size: u64, max_bytes: u64) -> Result<()> {
    if !mime.starts_with("image/") {
        return Err(Error::Image("Please select an image file".to_string()));
    }
    if size > max_bytes {
        return Err(Error::Image(format!(
            "Image is too large ({} bytes). The limit is {} bytes.",
            size, max_bytes
        )));
    }
    Ok(())
}

/// Guess a MIME type from magic bytes, then the file extension
pub fn sniff_mime(path: &Path, head: &[u8]) -> Option<&'static str> {
    let by_magic = if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("image/webp")
    } else if head.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    };

    by_magic.or_else(|| {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "bmp" => Some("image/bmp"),
            "svg" => Some("image/svg+xml"),
            _ => None,
        }
    })
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// A validated upload ready to send
#[derive(Debug, Clone)]
pub struct Upload {
    pub mime: String,
    pub size: u64,
    pub data_url: String,
}

/// Validate and read an image file into a data URL.
///
/// The size check happens before the file is read.
pub fn read_upload(path: &Path, max_bytes: u64) -> Result<Upload> {
    let size = std::fs::metadata(path)?.len();
    let bytes = if size > max_bytes {
        Vec::new()
    } else {
        std::fs::read(path)?
    };
    let mime = sniff_mime(path, &bytes).unwrap_or("application/octet-stream");
    validate_upload(mime, size, max_bytes)?;

    tracing::debug!(path = %path.display(), mime, size, "Read upload");
    Ok(Upload {
        mime: mime.to_string(),
        size,
        data_url: to_data_url(mime, &bytes),
    })
}

/// How an upload's analysis ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Analyzed,
    /// An apology was rendered in place of the analysis
    Failed(CompletionError),
}

/// A generated image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub model: String,
}

/// Vision analysis and image generation on top of the completion client
#[derive(Clone)]
pub struct ImagePipeline {
    client: CompletionClient,
    models: ModelRegistry,
    config: ImageConfig,
}

impl ImagePipeline {
    pub fn new(client: CompletionClient, models: ModelRegistry, config: ImageConfig) -> Self {
        Self {
            client,
            models,
            config,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.config.max_upload_bytes
    }

    /// Ask the default vision model to describe an image
    pub async fn analyze(&self, data_url: &str) -> std::result::Result<String, CompletionError> {
        let model = self.models.default_vision_model();
        tracing::info!(model = model.id, "Analyzing image");
        self.client
            .complete_vision(&self.config.analysis_prompt, data_url, model.id)
            .await
    }

    /// Generate an image from `prompt` with `model_id`, or the default
    /// image model.
    pub async fn generate(
        &self,
        prompt: &str,
        model_id: Option<&str>,
    ) -> std::result::Result<GeneratedImage, CompletionError> {
        let model = match model_id {
            Some(id) => id.to_string(),
            None => self
                .models
                .default_image_model()
                .map(|m| m.id.to_string())
                .unwrap_or_default(),
        };
        if let Some(descriptor) = self.models.find(&model) {
            if descriptor.kind != ModelKind::Image {
                tracing::warn!(model = %model, kind = %descriptor.kind, "Generating with a non-image model");
            }
        }

        let url = self
            .client
            .generate_image(&self.config.endpoint, prompt, &model, &self.config.size)
            .await?;
        tracing::info!(model = %model, "Image generated");
        Ok(GeneratedImage { url, model })
    }

    /// Validate an upload, show it and the analysis placeholder.
    ///
    /// Returns the data URL to analyse and the placeholder handle.
    pub fn begin_upload(
        &self,
        ctx: &mut ChatContext,
        path: &Path,
    ) -> Result<(String, TypingHandle)> {
        let upload = read_upload(path, self.config.max_upload_bytes)?;
        ctx.transcript.render_image(Role::User, &upload.data_url);
        let handle = ctx.transcript.show_typing(ANALYZING_LABEL);
        Ok((upload.data_url, handle))
    }

    /// Replace the placeholder with the analysis, or an apology
    pub fn finish_upload(
        &self,
        ctx: &mut ChatContext,
        handle: TypingHandle,
        analysis: std::result::Result<String, CompletionError>,
    ) -> UploadOutcome {
        ctx.transcript.remove_typing(handle);
        let (content, outcome) = match analysis {
            Ok(text) => (text, UploadOutcome::Analyzed),
            Err(e) => {
                tracing::warn!(error = %e, "Image analysis failed");
                let content = match e {
                    CompletionError::ImagesUnsupported { .. }
                    | CompletionError::ModelAccessDenied { .. } => e.user_message(),
                    _ => ANALYSIS_FAILED.to_string(),
                };
                (content, UploadOutcome::Failed(e))
            }
        };
        ctx.transcript
            .render_message(&Message::new(Role::Assistant, content), false);
        outcome
    }

    /// Show an upload and its analysis in `ctx`'s transcript.
    ///
    /// Validation failures are returned as errors; analysis failures are
    /// rendered in the transcript and reported in the outcome.
    pub async fn upload(&self, ctx: &mut ChatContext, path: &Path) -> Result<UploadOutcome> {
        let (data_url, handle) = self.begin_upload(ctx, path)?;
        let analysis = self.analyze(&data_url).await;
        Ok(self.finish_upload(ctx, handle, analysis))
    }

    /// Render a generated image as an assistant entry
    pub fn show_generated(&self, ctx: &mut ChatContext, image: &GeneratedImage) {
        ctx.transcript.render_image(Role::Assistant, &image.url);
    }
}
