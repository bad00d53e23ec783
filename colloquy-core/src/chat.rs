//! The message send pipeline.
//!
//! All per-view state lives in a [`ChatContext`]; [`ChatService`] holds the
//! shared collaborators and is cheap to clone into background tasks.
//!
//! A send is split in three so a front end can keep drawing while the
//! network request runs:
//!
//! 1. [`ChatService::begin_send`] persists and renders the user message and
//!    shows the typing placeholder,
//! 2. [`ChatService::fetch_reply`] does the network work and touches no
//!    view state,
//! 3. [`ChatService::finish_send`] persists and renders the outcome.
//!
//! [`ChatService::send_message`] runs all three in order.

use crate::completion::{CompletionClient, CompletionError};
use crate::config::Config;
use crate::error::Result;
use crate::image::ImagePipeline;
use crate::models::ModelRegistry;
use crate::render::{RoleStyles, Transcript, TypingHandle};
use crate::search::SearchAugmenter;
use crate::store::ConversationStore;
use crate::types::{Message, ModelDescriptor, ModelKind, Role, DEFAULT_CHAT_TITLE};

/// State for one open chat view
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub uid: String,
    /// Chat being shown; `None` until the first message of a new chat
    pub current_chat_id: Option<String>,
    pub is_generating: bool,
    pub web_search_enabled: bool,
    /// Model id picked in the UI; `None` means the registry default
    pub selected_model: Option<String>,
    pub transcript: Transcript,
    pub title: String,
}

impl ChatContext {
    pub fn new(uid: impl Into<String>, styles: RoleStyles, web_search_enabled: bool) -> Self {
        Self {
            uid: uid.into(),
            current_chat_id: None,
            is_generating: false,
            web_search_enabled,
            selected_model: None,
            transcript: Transcript::new(styles),
            title: DEFAULT_CHAT_TITLE.to_string(),
        }
    }
}

/// Everything the network phase needs, owned so it can move into a task
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub text: String,
    pub model: ModelDescriptor,
    pub search: bool,
}

/// A send between its first and last phase
#[derive(Debug)]
pub struct PendingSend {
    pub request: ReplyRequest,
    /// Account the message was sent from
    pub uid: String,
    pub chat_id: String,
    typing: TypingHandle,
}

/// What the network phase produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub used_search: bool,
    pub image_url: Option<String>,
}

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty input, or a send was already running
    Ignored,
    Replied { content: String, used_search: bool },
    /// The reply failed; the guidance text was rendered, not stored
    Failed(CompletionError),
}

/// Send pipeline over the store, search and completion collaborators
#[derive(Clone)]
pub struct ChatService {
    store: ConversationStore,
    completion: CompletionClient,
    search: SearchAugmenter,
    images: ImagePipeline,
    models: ModelRegistry,
    assistant_name: String,
    search_default: bool,
}

impl ChatService {
    /// Build every collaborator from configuration
    pub fn from_config(config: &Config, store: ConversationStore) -> Result<Self> {
        let models = ModelRegistry::from_config(&config.models)?;
        let completion = CompletionClient::new(&config.completion)?;
        let search = SearchAugmenter::new(&config.search)?;
        let images = ImagePipeline::new(completion.clone(), models.clone(), config.image.clone());

        Ok(Self {
            store,
            completion,
            search,
            images,
            models,
            assistant_name: config.ui.assistant_name.clone(),
            search_default: config.search.enabled,
        })
    }

    /// A fresh view for `uid`
    pub fn context(&self, uid: &str) -> ChatContext {
        ChatContext::new(
            uid,
            RoleStyles::new(&self.assistant_name),
            self.search_default,
        )
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    pub fn images(&self) -> &ImagePipeline {
        &self.images
    }

    /// Persist and show the user's message, then show the placeholder.
    ///
    /// Returns `None` for empty input or while a reply is pending.
    pub fn begin_send(&self, ctx: &mut ChatContext, text: &str) -> Result<Option<PendingSend>> {
        let text = text.trim();
        if text.is_empty() || ctx.is_generating {
            return Ok(None);
        }

        ctx.is_generating = true;
        match self.persist_user_message(ctx, text) {
            Ok(chat_id) => {
                let typing = ctx.transcript.show_typing(&ctx.transcript.styles().typing_label());
                let model = self
                    .models
                    .current_model(ctx.selected_model.as_deref())
                    .clone();
                tracing::info!(chat_id = %chat_id, model = model.id, "Sending message");
                Ok(Some(PendingSend {
                    request: ReplyRequest {
                        text: text.to_string(),
                        model,
                        search: ctx.web_search_enabled,
                    },
                    uid: ctx.uid.clone(),
                    chat_id,
                    typing,
                }))
            }
            Err(e) => {
                ctx.is_generating = false;
                tracing::error!(error = %e, "Failed to store user message");
                Err(e)
            }
        }
    }

    fn persist_user_message(&self, ctx: &mut ChatContext, text: &str) -> Result<String> {
        let chat_id = match &ctx.current_chat_id {
            Some(id) => id.clone(),
            None => {
                let id = self.store.create_chat(&ctx.uid)?;
                ctx.current_chat_id = Some(id.clone());
                id
            }
        };

        let chat = self
            .store
            .append_message(&ctx.uid, &chat_id, Role::User, text)?;
        ctx.title = chat.title.clone();
        if let Some(message) = chat.messages.last() {
            ctx.transcript.render_message(message, false);
        }
        Ok(chat_id)
    }

    /// Produce the assistant reply. Touches no view state.
    pub async fn fetch_reply(
        &self,
        request: &ReplyRequest,
    ) -> std::result::Result<Reply, CompletionError> {
        if request.model.kind == ModelKind::Image {
            let image = self
                .images
                .generate(&request.text, Some(request.model.id))
                .await?;
            return Ok(Reply {
                content: format!("Generated with {}: {}", request.model.name, image.url),
                used_search: false,
                image_url: Some(image.url),
            });
        }

        let (prompt, used_search) = if request.search {
            self.search.prepare_prompt(&request.text).await
        } else {
            (request.text.clone(), false)
        };

        let content = self.completion.complete(&prompt, request.model.id).await?;
        Ok(Reply {
            content,
            used_search,
            image_url: None,
        })
    }

    /// Replace the placeholder with the reply or the failure guidance.
    ///
    /// Replies are stored in the chat and account they were sent from; they
    /// are only drawn if `ctx` still shows that chat for that account.
    pub fn finish_send(
        &self,
        ctx: &mut ChatContext,
        pending: PendingSend,
        outcome: std::result::Result<Reply, CompletionError>,
    ) -> Result<SendOutcome> {
        if ctx.uid != pending.uid {
            return self.finish_detached(pending, outcome);
        }

        ctx.is_generating = false;
        ctx.transcript.remove_typing(pending.typing);
        let visible = ctx.current_chat_id.as_deref() == Some(pending.chat_id.as_str());

        match outcome {
            Ok(reply) => {
                let chat = self.store.append_message(
                    &pending.uid,
                    &pending.chat_id,
                    Role::Assistant,
                    &reply.content,
                );

                if visible {
                    if let Some(url) = &reply.image_url {
                        ctx.transcript.render_image(Role::Assistant, url);
                    }
                    let message = Message::new(Role::Assistant, reply.content.clone());
                    ctx.transcript.render_message(&message, reply.used_search);
                }

                let chat = chat?;
                if visible {
                    ctx.title = chat.title;
                }
                Ok(SendOutcome::Replied {
                    content: reply.content,
                    used_search: reply.used_search,
                })
            }
            Err(e) => {
                tracing::warn!(chat_id = %pending.chat_id, error = %e, "Reply failed");
                if visible {
                    let message = Message::new(Role::Assistant, e.user_message());
                    ctx.transcript.render_message(&message, false);
                }
                Ok(SendOutcome::Failed(e))
            }
        }
    }

    /// Store the outcome of a send whose view is gone, e.g. after sign-out
    pub fn finish_detached(
        &self,
        pending: PendingSend,
        outcome: std::result::Result<Reply, CompletionError>,
    ) -> Result<SendOutcome> {
        match outcome {
            Ok(reply) => {
                self.store.append_message(
                    &pending.uid,
                    &pending.chat_id,
                    Role::Assistant,
                    &reply.content,
                )?;
                tracing::debug!(chat_id = %pending.chat_id, "Stored reply for a closed view");
                Ok(SendOutcome::Replied {
                    content: reply.content,
                    used_search: reply.used_search,
                })
            }
            Err(e) => {
                tracing::warn!(chat_id = %pending.chat_id, error = %e, "Reply failed");
                Ok(SendOutcome::Failed(e))
            }
        }
    }

    /// Run a whole send: store, request, store, render
    pub async fn send_message(&self, ctx: &mut ChatContext, text: &str) -> Result<SendOutcome> {
        let Some(pending) = self.begin_send(ctx, text)? else {
            return Ok(SendOutcome::Ignored);
        };
        let outcome = self.fetch_reply(&pending.request).await;
        self.finish_send(ctx, pending, outcome)
    }

    /// Start a new, not yet stored, chat
    pub fn new_chat(&self, ctx: &mut ChatContext) {
        ctx.current_chat_id = None;
        ctx.title = DEFAULT_CHAT_TITLE.to_string();
        ctx.transcript.clear();
    }

    /// Show a stored chat
    pub fn open_chat(&self, ctx: &mut ChatContext, chat_id: &str) -> Result<()> {
        let chat = self.store.load_chat(&ctx.uid, chat_id)?;
        ctx.current_chat_id = Some(chat_id.to_string());
        ctx.title = chat.title.clone();
        ctx.transcript.load_chat(&chat);
        tracing::debug!(chat_id, messages = chat.messages.len(), "Opened chat");
        Ok(())
    }

    /// Flip web search for this view and return the new setting
    pub fn toggle_web_search(&self, ctx: &mut ChatContext) -> bool {
        ctx.web_search_enabled = !ctx.web_search_enabled;
        ctx.web_search_enabled
    }

    /// Select a model by id; unknown ids fall back to the default
    pub fn select_model<'a>(&'a self, ctx: &mut ChatContext, id: &str) -> &'a ModelDescriptor {
        let model = self.models.current_model(Some(id));
        if !self.models.is_available(model.id) {
            tracing::info!(model = model.id, "Selected model is outside the current plan");
        }
        ctx.selected_model = Some(model.id.to_string());
        model
    }
}
