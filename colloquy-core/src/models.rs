//! Model registry
//!
//! A static catalog of remote models plus the two pieces of policy that sit
//! on top of it: which model is used when the selection is unset or unknown,
//! and which models the current plan may call.

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::types::{ModelDescriptor, ModelKind};

/// Every model the client knows about, in display order
pub const CATALOG: &[ModelDescriptor] = &[
    text("provider-3/deepseek-v3", "DeepSeek V3"),
    text("provider-3/deepseek-v3-0324", "DeepSeek V3 (0324)"),
    text("provider-3/llama-3-70b", "Llama 3 70B"),
    text("provider-3/llama-3.1-70b", "Llama 3.1 70B"),
    text("provider-3/llama-3.2-3b", "Llama 3.2 3B"),
    text("provider-3/llama-3.3-70b", "Llama 3.3 70B"),
    text("provider-3/gpt-4o-mini", "GPT-4o Mini"),
    text("provider-3/qwen-2.5-72b", "Qwen 2.5 72B"),
    text("provider-3/mistral-small-latest", "Mistral Small"),
    text("provider-3/gemma-3-27b-it", "Gemma 3 27B"),
    image("provider-5/midjourney-v7", "Midjourney V7"),
    image("provider-4/imagen-3", "Imagen 3"),
    image("provider-4/imagen-4", "Imagen 4"),
    image("provider-4/qwen-image", "Qwen Image"),
    vision("provider-1/internvl3-78b", "InternVL3 78B"),
    vision("provider-1/qwen2.5-vl-72b-instruct", "Qwen2.5 VL 72B"),
];

/// Model used when the selection is unset or unknown
pub const DEFAULT_MODEL: &str = "provider-3/qwen-2.5-72b";

/// Vision model used for uploaded images
pub const DEFAULT_VISION_MODEL: &str = "provider-1/internvl3-78b";

/// Models callable on the free plan
pub const FREE_PLAN_MODELS: &[&str] = &[
    "provider-3/qwen-2.5-72b",
    "provider-3/deepseek-v3",
    "provider-3/llama-3-70b",
    "provider-3/mistral-small-latest",
];

const fn text(id: &'static str, name: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        id,
        name,
        kind: ModelKind::Text,
    }
}

const fn image(id: &'static str, name: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        id,
        name,
        kind: ModelKind::Image,
    }
}

const fn vision(id: &'static str, name: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        id,
        name,
        kind: ModelKind::Vision,
    }
}

/// Display order of the kind groups
const GROUP_ORDER: [ModelKind; 3] = [ModelKind::Text, ModelKind::Image, ModelKind::Vision];

/// Catalog plus default-model and allow-list policy
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: &'static [ModelDescriptor],
    default_idx: usize,
    vision_idx: usize,
    allowed: Vec<String>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// Registry with the built-in defaults and the free-plan allow-list
    pub fn builtin() -> Self {
        Self {
            models: CATALOG,
            default_idx: index_of(DEFAULT_MODEL).unwrap_or(0),
            vision_idx: index_of(DEFAULT_VISION_MODEL).unwrap_or(0),
            allowed: FREE_PLAN_MODELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Registry with `[models]` overrides applied.
    ///
    /// Unknown model ids in the defaults are a configuration error.
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let mut registry = Self::builtin();

        if let Some(id) = &config.default {
            registry.default_idx = index_of(id)
                .ok_or_else(|| Error::Config(format!("models.default is not a known model: {}", id)))?;
        }

        if let Some(id) = &config.vision_default {
            let idx = index_of(id).ok_or_else(|| {
                Error::Config(format!("models.vision_default is not a known model: {}", id))
            })?;
            if CATALOG[idx].kind != ModelKind::Vision {
                return Err(Error::Config(format!(
                    "models.vision_default is not a vision model: {}",
                    id
                )));
            }
            registry.vision_idx = idx;
        }

        if let Some(allowed) = &config.allowed {
            if allowed.is_empty() {
                return Err(Error::Config(
                    "models.allowed must list at least one model".to_string(),
                ));
            }
            for id in allowed.iter().filter(|id| index_of(id).is_none()) {
                tracing::warn!(model = %id, "Allowed model is not in the catalog");
            }
            registry.allowed = allowed.clone();
        }

        Ok(registry)
    }

    /// Every model in insertion order
    pub fn list_models(&self) -> &[ModelDescriptor] {
        self.models
    }

    /// Models grouped by kind for display; empty groups are left out.
    pub fn grouped(&self) -> Vec<(ModelKind, Vec<&ModelDescriptor>)> {
        GROUP_ORDER
            .iter()
            .map(|kind| {
                let models: Vec<_> = self.models.iter().filter(|m| m.kind == *kind).collect();
                (*kind, models)
            })
            .filter(|(_, models)| !models.is_empty())
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// The selected model, or the default when unset or unmatched
    pub fn current_model(&self, selection: Option<&str>) -> &ModelDescriptor {
        selection
            .and_then(|id| self.find(id))
            .unwrap_or(&self.models[self.default_idx])
    }

    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default_idx]
    }

    pub fn default_vision_model(&self) -> &ModelDescriptor {
        &self.models[self.vision_idx]
    }

    /// First image-generation model in the catalog
    pub fn default_image_model(&self) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.kind == ModelKind::Image)
    }

    /// Whether the current plan may call `id`
    pub fn is_available(&self, id: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == id)
    }

    /// The id that follows `current` in catalog order, wrapping around
    pub fn next_after(&self, current: &str) -> &ModelDescriptor {
        let idx = self
            .models
            .iter()
            .position(|m| m.id == current)
            .map(|i| (i + 1) % self.models.len())
            .unwrap_or(self.default_idx);
        &self.models[idx]
    }
}

fn index_of(id: &str) -> Option<usize> {
    CATALOG.iter().position(|m| m.id == id)
}
