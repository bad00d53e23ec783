//! Application state for the TUI.

use std::path::PathBuf;
use std::sync::Arc;

use colloquy_core::chat::{PendingSend, Reply};
use colloquy_core::completion::{CompletionError, ProbeResult};
use colloquy_core::render::TypingHandle;
use colloquy_core::session::{
    describe_auth_failure, AuthAction, AuthFlow, AuthFormMode, GateEvent, Screen,
};
use colloquy_core::store::ChatListWatch;
use colloquy_core::{
    Chat, ChatContext, ChatService, ConversationStore, IdentityProvider, LocalIdentityProvider,
    SendOutcome, SessionGate, UploadOutcome,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Results delivered by background tasks
pub enum AppEvent {
    Reply {
        pending: PendingSend,
        outcome: Result<Reply, CompletionError>,
    },
    Analysis {
        handle: TypingHandle,
        result: Result<String, CompletionError>,
    },
    Probe(Vec<ProbeResult>),
}

/// Which auth form field has the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthField {
    Name,
    #[default]
    Email,
    Password,
}

/// Which chat-screen pane takes keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Input,
    Sidebar,
}

/// Main application state.
pub struct App {
    provider: Arc<LocalIdentityProvider>,
    store: ConversationStore,
    pub chat: ChatService,
    /// Auth state and form contents
    pub gate: SessionGate,
    /// Present while signed in
    pub ctx: Option<ChatContext>,
    /// Sidebar contents, most recent first
    pub chats: Vec<Chat>,
    watch: Option<ChatListWatch>,
    pub sidebar_state: ListState,
    pub input: String,
    pub auth_field: AuthField,
    pub focus: Focus,
    /// One-line status shown in the footer
    pub status: Option<String>,
    /// Lines scrolled up from the bottom of the transcript
    pub scroll_back: u16,
    /// Frame counter for the typing animation
    pub tick: u64,
    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
    /// Whether the app should exit
    pub should_quit: bool,
}

impl App {
    pub fn new(
        provider: Arc<LocalIdentityProvider>,
        store: ConversationStore,
        chat: ChatService,
    ) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut gate = SessionGate::new(store.clone());
        gate.install(provider.as_ref());

        Self {
            provider,
            store,
            chat,
            gate,
            ctx: None,
            chats: Vec::new(),
            watch: None,
            sidebar_state: ListState::default(),
            input: String::new(),
            auth_field: AuthField::default(),
            focus: Focus::default(),
            status: None,
            scroll_back: 0,
            tick: 0,
            tx,
            rx,
            should_quit: false,
        }
    }

    /// Health-check completion endpoints in the background
    pub fn spawn_probe(&self) {
        let client = self.chat.completion().clone();
        let model = self.chat.models().default_model().id;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let results = client.probe_endpoints(model).await;
            let _ = tx.send(AppEvent::Probe(results));
        });
    }

    /// Apply auth changes, chat list updates and finished background work.
    pub fn update(&mut self) {
        self.tick = self.tick.wrapping_add(1);

        while let Some(event) = self.gate.poll() {
            self.on_gate_event(event);
        }

        if let Some(watch) = self.watch.as_mut() {
            match watch.try_next() {
                Some(Ok(chats)) => self.set_chats(chats),
                Some(Err(e)) => tracing::warn!(error = %e, "Failed to refresh chat list"),
                None => {}
            }
        }

        while let Ok(event) = self.rx.try_recv() {
            self.on_app_event(event);
        }
    }

    fn on_gate_event(&mut self, event: GateEvent) {
        match event {
            GateEvent::SignedIn {
                identity,
                display_name,
                initialize_chat,
            } => {
                if initialize_chat || self.ctx.is_none() {
                    self.ctx = Some(self.chat.context(&identity.uid));
                    self.watch = match self.store.watch_chats(&identity.uid) {
                        Ok(watch) => Some(watch),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to watch chats");
                            None
                        }
                    };
                    self.chats.clear();
                    self.sidebar_state.select(None);
                    self.input.clear();
                    self.focus = Focus::Input;
                }
                self.status = Some(format!("Signed in as {}", display_name));
            }
            GateEvent::SignedOut => {
                self.ctx = None;
                self.watch = None;
                self.chats.clear();
                self.input.clear();
                self.auth_field = AuthField::default();
                self.status = None;
            }
        }
    }

    fn on_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Reply { pending, outcome } => {
                // Signed out since sending; store it for the sender anyway
                let Some(ctx) = self.ctx.as_mut() else {
                    if let Err(e) = self.chat.finish_detached(pending, outcome) {
                        tracing::error!(error = %e, "Failed to save reply");
                    }
                    return;
                };
                match self.chat.finish_send(ctx, pending, outcome) {
                    Ok(SendOutcome::Failed(e)) => self.status = Some(e.to_string()),
                    Ok(_) => self.status = None,
                    Err(e) => self.status = Some(format!("Failed to save reply: {}", e)),
                }
                self.scroll_back = 0;
            }
            AppEvent::Analysis { handle, result } => {
                if let Some(ctx) = self.ctx.as_mut() {
                    self.status = match self.chat.images().finish_upload(ctx, handle, result) {
                        UploadOutcome::Failed(e) => Some(e.to_string()),
                        UploadOutcome::Analyzed => None,
                    };
                    self.scroll_back = 0;
                }
            }
            AppEvent::Probe(results) => {
                let healthy = results.iter().filter(|r| r.healthy).count();
                if healthy == 0 && !results.is_empty() {
                    self.status = Some("No completion endpoint answered the health check".to_string());
                }
                tracing::info!(healthy, total = results.len(), "Endpoint probe finished");
            }
        }
    }

    fn set_chats(&mut self, chats: Vec<Chat>) {
        let selected_id = self
            .sidebar_state
            .selected()
            .and_then(|i| self.chats.get(i))
            .map(|c| c.id.clone());
        self.chats = chats;
        let idx = selected_id
            .and_then(|id| self.chats.iter().position(|c| c.id == id))
            .or_else(|| (!self.chats.is_empty()).then_some(0));
        self.sidebar_state.select(idx);
    }

    pub fn screen(&self) -> Screen {
        self.gate.screen()
    }

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.screen() {
            Screen::Auth => self.handle_auth_key(key),
            Screen::Chat => match self.focus {
                Focus::Input => self.handle_input_key(key),
                Focus::Sidebar => self.handle_sidebar_key(key),
            },
        }
    }

    /// Handle keyboard input on the auth screen.
    fn handle_auth_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::F(2) => {
                self.gate.forms_mut().toggle_mode();
                self.auth_field = match self.gate.forms().mode {
                    AuthFormMode::SignUp => AuthField::Name,
                    AuthFormMode::Login => AuthField::Email,
                };
            }
            KeyCode::Tab | KeyCode::Down => self.auth_field = self.next_auth_field(),
            KeyCode::BackTab | KeyCode::Up => self.auth_field = self.previous_auth_field(),
            KeyCode::Enter => self.submit_auth(),
            KeyCode::Backspace => {
                self.auth_field_mut().pop();
            }
            KeyCode::Char(c) => self.auth_field_mut().push(c),
            _ => {}
        }
    }

    fn next_auth_field(&self) -> AuthField {
        match (self.gate.forms().mode, self.auth_field) {
            (AuthFormMode::SignUp, AuthField::Name) => AuthField::Email,
            (_, AuthField::Email) => AuthField::Password,
            (AuthFormMode::SignUp, AuthField::Password) => AuthField::Name,
            (AuthFormMode::Login, _) => AuthField::Email,
        }
    }

    fn previous_auth_field(&self) -> AuthField {
        match (self.gate.forms().mode, self.auth_field) {
            (AuthFormMode::SignUp, AuthField::Name) => AuthField::Password,
            (AuthFormMode::SignUp, AuthField::Email) => AuthField::Name,
            (_, AuthField::Password) => AuthField::Email,
            (AuthFormMode::Login, _) => AuthField::Password,
        }
    }

    fn auth_field_mut(&mut self) -> &mut String {
        let field = self.auth_field;
        let forms = self.gate.forms_mut();
        match field {
            AuthField::Name => &mut forms.name,
            AuthField::Email => &mut forms.email,
            AuthField::Password => &mut forms.password,
        }
    }

    fn submit_auth(&mut self) {
        let forms = self.gate.forms().clone();
        let flow = AuthFlow::new(self.provider.as_ref(), &self.store);

        let (action, result) = match forms.mode {
            AuthFormMode::SignUp => (
                AuthAction::SignUp,
                flow.sign_up(&forms.name, &forms.email, &forms.password),
            ),
            AuthFormMode::Login => (
                AuthAction::SignIn,
                flow.sign_in(&forms.email, &forms.password),
            ),
        };

        if let Err(e) = result {
            tracing::info!(error = %e, "Auth form rejected");
            self.gate.forms_mut().error = Some(describe_auth_failure(action, &e));
        }
    }

    /// Handle keyboard input while typing a message.
    fn handle_input_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('n') if ctrl => self.new_chat(),
            KeyCode::Char('w') if ctrl => self.toggle_web_search(),
            KeyCode::Char('o') if ctrl => self.cycle_model(),
            KeyCode::Char('l') if ctrl => self.sign_out(),
            KeyCode::Tab => self.focus = Focus::Sidebar,
            KeyCode::PageUp => self.scroll_back = self.scroll_back.saturating_add(5),
            KeyCode::PageDown => self.scroll_back = self.scroll_back.saturating_sub(5),
            KeyCode::Enter => self.submit_input(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) if !ctrl => self.input.push(c),
            _ => {}
        }
    }

    /// Handle keyboard input in the chat list.
    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Tab => self.focus = Focus::Input,
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Enter => {
                self.open_selected_chat();
                self.focus = Focus::Input;
            }
            KeyCode::Char('n') => {
                self.new_chat();
                self.focus = Focus::Input;
            }
            _ => {}
        }
    }

    fn select_next(&mut self) {
        if self.chats.is_empty() {
            return;
        }
        let i = match self.sidebar_state.selected() {
            Some(i) if i + 1 < self.chats.len() => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.sidebar_state.select(Some(i));
    }

    fn select_previous(&mut self) {
        if self.chats.is_empty() {
            return;
        }
        let i = self.sidebar_state.selected().unwrap_or(0).saturating_sub(1);
        self.sidebar_state.select(Some(i));
    }

    fn open_selected_chat(&mut self) {
        let Some(id) = self
            .sidebar_state
            .selected()
            .and_then(|i| self.chats.get(i))
            .map(|c| c.id.clone())
        else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            if let Err(e) = self.chat.open_chat(ctx, &id) {
                tracing::warn!(chat_id = %id, error = %e, "Failed to open chat");
                self.status = Some(format!("Could not open chat: {}", e));
            }
            self.scroll_back = 0;
        }
    }

    fn new_chat(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            self.chat.new_chat(ctx);
            self.scroll_back = 0;
            self.status = None;
        }
    }

    fn toggle_web_search(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            let enabled = self.chat.toggle_web_search(ctx);
            self.status = Some(format!(
                "Web search {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
    }

    fn cycle_model(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            let current = self.chat.models().current_model(ctx.selected_model.as_deref()).id;
            let next = self.chat.models().next_after(current).id;
            let model = self.chat.select_model(ctx, next);
            let plan = if self.chat.models().is_available(model.id) {
                ""
            } else {
                " (not on current plan)"
            };
            self.status = Some(format!("Model: {}{}", model.name, plan));
        }
    }

    fn sign_out(&mut self) {
        let flow = AuthFlow::new(self.provider.as_ref(), &self.store);
        if let Err(e) = flow.sign_out() {
            self.status = Some(describe_auth_failure(AuthAction::SignOut, &e));
        }
    }

    /// Send the input line, or run `/image <path>`
    fn submit_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        if let Some(path) = text.trim().strip_prefix("/image ") {
            self.start_upload(PathBuf::from(path.trim()));
            return;
        }

        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        match self.chat.begin_send(ctx, &text) {
            Ok(Some(pending)) => {
                self.scroll_back = 0;
                let chat = self.chat.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let outcome = chat.fetch_reply(&pending.request).await;
                    let _ = tx.send(AppEvent::Reply { pending, outcome });
                });
            }
            Ok(None) => {
                // Keep the text while a reply is pending
                if ctx.is_generating {
                    self.input = text;
                }
            }
            Err(e) => {
                self.input = text;
                self.status = Some(format!("Could not send: {}", e));
            }
        }
    }

    fn start_upload(&mut self, path: PathBuf) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        match self.chat.images().begin_upload(ctx, &path) {
            Ok((data_url, handle)) => {
                self.scroll_back = 0;
                let images = self.chat.images().clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = images.analyze(&data_url).await;
                    let _ = tx.send(AppEvent::Analysis { handle, result });
                });
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    /// Whether the current identity is signed in with the provider
    pub fn signed_in(&self) -> bool {
        self.provider.current().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{Config, Database};

    fn app() -> App {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let db = Arc::new(db);
        let provider = Arc::new(LocalIdentityProvider::new(Arc::clone(&db)));
        let store = ConversationStore::new(db);
        let chat = ChatService::from_config(&Config::default(), store.clone()).unwrap();
        App::new(provider, store, chat)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_sign_up_switches_to_chat() {
        let mut app = app();
        app.update();
        assert_eq!(app.screen(), Screen::Auth);

        app.handle_key(key(KeyCode::F(2)));
        assert_eq!(app.auth_field, AuthField::Name);
        type_text(&mut app, "Ada");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "ada@example.com");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "secret1");
        app.handle_key(key(KeyCode::Enter));

        app.update();
        assert_eq!(app.screen(), Screen::Chat);
        assert!(app.ctx.is_some());
        assert!(app.signed_in());
    }

    #[test]
    fn test_login_validation_error_is_shown() {
        let mut app = app();
        app.update();
        type_text(&mut app, "ada@example.com");
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(
            app.gate.forms().error.as_deref(),
            Some("Please enter both email and password")
        );
        assert_eq!(app.screen(), Screen::Auth);
    }

    #[test]
    fn test_sign_out_returns_to_auth() {
        let mut app = app();
        app.update();
        AuthFlow::new(app.provider.as_ref(), &app.store)
            .sign_up("Ada", "ada@example.com", "secret1")
            .unwrap();
        app.update();
        assert_eq!(app.screen(), Screen::Chat);

        app.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        app.update();

        assert_eq!(app.screen(), Screen::Auth);
        assert!(app.ctx.is_none());
    }

    #[test]
    fn test_reply_after_sign_out_is_still_stored() {
        let mut app = app();
        app.update();
        let identity = AuthFlow::new(app.provider.as_ref(), &app.store)
            .sign_up("Ada", "ada@example.com", "secret1")
            .unwrap();
        app.update();

        let ctx = app.ctx.as_mut().unwrap();
        let pending = app.chat.begin_send(ctx, "Question").unwrap().unwrap();
        let chat_id = pending.chat_id.clone();

        app.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        app.update();
        assert!(app.ctx.is_none());

        app.tx
            .send(AppEvent::Reply {
                pending,
                outcome: Ok(Reply {
                    content: "late answer".to_string(),
                    used_search: false,
                    image_url: None,
                }),
            })
            .unwrap();
        app.update();

        let chat = app.store.load_chat(&identity.uid, &chat_id).unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].content, "late answer");
        assert_eq!(app.screen(), Screen::Auth);
    }
}
