//! Session gate: follows auth state and decides which screen is showing.
//!
//! The gate subscribes to an [`IdentityProvider`] exactly once. Each
//! signed-in event switches to the chat screen and loads (or creates) the
//! user's profile; each signed-out event returns to the auth screen and
//! clears the forms. Profile storage failures only degrade the displayed
//! name, they never hold up the screen switch.
//!
//! [`AuthFlow`] holds the sign-up / sign-in / sign-out form handlers.

use chrono::Utc;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::identity::{IdentityProvider, MIN_PASSWORD_LEN};
use crate::store::ConversationStore;
use crate::types::{Identity, UserProfile};

/// Which top-level screen is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Auth,
    Chat,
}

/// Which auth form is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthFormMode {
    #[default]
    Login,
    SignUp,
}

/// In-progress auth form state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthForms {
    pub mode: AuthFormMode,
    pub name: String,
    pub email: String,
    pub password: String,
    /// Last error shown under the form
    pub error: Option<String>,
}

impl AuthForms {
    /// Clear every field and return to the login form
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Flip between login and sign-up, keeping the email
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthFormMode::Login => AuthFormMode::SignUp,
            AuthFormMode::SignUp => AuthFormMode::Login,
        };
        self.password.clear();
        self.error = None;
    }
}

/// What a handled auth event means for the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    SignedIn {
        identity: Identity,
        display_name: String,
        /// True when chat components should (re)initialize for this user
        initialize_chat: bool,
    },
    SignedOut,
}

/// Auth-state driven screen switching
pub struct SessionGate {
    store: ConversationStore,
    rx: Option<watch::Receiver<Option<Identity>>>,
    pending_initial: bool,
    screen: Screen,
    identity: Option<Identity>,
    display_name: Option<String>,
    forms: AuthForms,
    chat_transitions: usize,
}

impl SessionGate {
    pub fn new(store: ConversationStore) -> Self {
        Self {
            store,
            rx: None,
            pending_initial: false,
            screen: Screen::Auth,
            identity: None,
            display_name: None,
            forms: AuthForms::default(),
            chat_transitions: 0,
        }
    }

    /// Subscribe to the provider's auth state.
    ///
    /// Only the first call installs a subscription; later calls return
    /// false and change nothing. The provider's current state is delivered
    /// by the next [`poll`](Self::poll) or [`changed`](Self::changed).
    pub fn install(&mut self, provider: &dyn IdentityProvider) -> bool {
        if self.rx.is_some() {
            tracing::debug!("Session gate already installed");
            return false;
        }
        self.rx = Some(provider.subscribe());
        self.pending_initial = true;
        tracing::info!("Session gate installed");
        true
    }

    /// Handle a pending auth event without waiting
    pub fn poll(&mut self) -> Option<GateEvent> {
        let rx = self.rx.as_mut()?;
        if self.pending_initial || rx.has_changed().unwrap_or(false) {
            self.pending_initial = false;
            let identity = rx.borrow_and_update().clone();
            return Some(self.handle(identity));
        }
        None
    }

    /// Wait for the next auth event.
    ///
    /// Returns `None` when not installed or once the provider is gone.
    pub async fn changed(&mut self) -> Option<GateEvent> {
        let rx = self.rx.as_mut()?;
        if !self.pending_initial {
            rx.changed().await.ok()?;
        }
        self.pending_initial = false;
        let identity = rx.borrow_and_update().clone();
        Some(self.handle(identity))
    }

    /// Apply one auth-state value
    pub fn handle(&mut self, identity: Option<Identity>) -> GateEvent {
        match identity {
            Some(identity) => self.signed_in(identity),
            None => self.signed_out(),
        }
    }

    fn signed_in(&mut self, identity: Identity) -> GateEvent {
        tracing::info!(uid = %identity.uid, "Auth state: signed in");

        if self.screen != Screen::Chat {
            self.screen = Screen::Chat;
            self.chat_transitions += 1;
        }

        let display_name = self.resolve_display_name(&identity);
        let initialize_chat = self.identity.as_ref().map(|i| &i.uid) != Some(&identity.uid);

        self.display_name = Some(display_name.clone());
        self.identity = Some(identity.clone());

        GateEvent::SignedIn {
            identity,
            display_name,
            initialize_chat,
        }
    }

    fn signed_out(&mut self) -> GateEvent {
        tracing::info!("Auth state: signed out");
        self.screen = Screen::Auth;
        self.identity = None;
        self.display_name = None;
        self.forms.reset();
        GateEvent::SignedOut
    }

    /// Read the profile, creating a default one when missing.
    fn resolve_display_name(&self, identity: &Identity) -> String {
        let fallback = || {
            if identity.email.is_empty() {
                "User".to_string()
            } else {
                identity.email.clone()
            }
        };

        match self.store.profile(&identity.uid) {
            Ok(Some(profile)) if !profile.name.trim().is_empty() => profile.name,
            Ok(Some(_)) => fallback(),
            Ok(None) => {
                tracing::info!(uid = %identity.uid, "No profile found, creating default");
                let profile = UserProfile::for_identity(identity, Utc::now());
                match self.store.save_profile(&identity.uid, &profile) {
                    Ok(()) => identity
                        .display_name
                        .clone()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(fallback),
                    Err(e) => {
                        tracing::warn!(uid = %identity.uid, error = %e, "Failed to create profile");
                        fallback()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(uid = %identity.uid, error = %e, "Failed to read profile");
                fallback()
            }
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn forms(&self) -> &AuthForms {
        &self.forms
    }

    pub fn forms_mut(&mut self) -> &mut AuthForms {
        &mut self.forms
    }

    /// Number of auth → chat screen switches so far
    pub fn chat_transitions(&self) -> usize {
        self.chat_transitions
    }
}

/// Which form produced a failure; selects the message prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignUp,
    SignIn,
    SignOut,
}

impl AuthAction {
    fn prefix(&self) -> &'static str {
        match self {
            AuthAction::SignUp => "Error creating account. ",
            AuthAction::SignIn => "Login failed. ",
            AuthAction::SignOut => "Sign out failed. ",
        }
    }
}

/// User-facing text for a failed auth form submission
pub fn describe_auth_failure(action: AuthAction, err: &Error) -> String {
    match err {
        Error::Validation(msg) => msg.clone(),
        other => format!("{}{}", action.prefix(), other),
    }
}

/// Form handlers for sign-up, sign-in and sign-out
pub struct AuthFlow<'a> {
    provider: &'a dyn IdentityProvider,
    store: &'a ConversationStore,
}

impl<'a> AuthFlow<'a> {
    pub fn new(provider: &'a dyn IdentityProvider, store: &'a ConversationStore) -> Self {
        Self { provider, store }
    }

    /// Validate the sign-up form, create the account and its profile
    pub fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::Validation("Please fill in all fields".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            )));
        }

        let identity = self.provider.sign_up(name, email, password)?;

        let now = Utc::now();
        let profile = UserProfile {
            name: name.to_string(),
            email: email.to_string(),
            created_at: now,
            last_login: now,
        };
        if let Err(e) = self.store.save_profile(&identity.uid, &profile) {
            // The account exists; the gate falls back to the email for display.
            tracing::warn!(uid = %identity.uid, error = %e, "Failed to save profile at sign-up");
        }

        Ok(identity)
    }

    /// Validate the login form, sign in and record the login time
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::Validation(
                "Please enter both email and password".to_string(),
            ));
        }

        let identity = self.provider.sign_in(email, password)?;

        if let Err(e) = self.store.touch_last_login(&identity.uid, Utc::now()) {
            tracing::warn!(uid = %identity.uid, error = %e, "Failed to update last login");
        }

        Ok(identity)
    }

    pub fn sign_out(&self) -> Result<()> {
        self.provider.sign_out()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::identity::{AuthError, LocalIdentityProvider};
    use crate::store::{Document, DocumentChange, DocumentStore};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn setup() -> (Arc<Database>, LocalIdentityProvider, ConversationStore) {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let db = Arc::new(db);
        let provider = LocalIdentityProvider::new(Arc::clone(&db));
        let store = ConversationStore::new(db.clone());
        (db, provider, store)
    }

    #[test]
    fn test_install_is_idempotent() {
        let (_db, provider, store) = setup();
        let mut gate = SessionGate::new(store);

        assert!(gate.install(&provider));
        assert!(!gate.install(&provider));

        // Initial state is delivered once
        assert_eq!(gate.poll(), Some(GateEvent::SignedOut));
        assert_eq!(gate.poll(), None);
    }

    #[test]
    fn test_sign_up_then_sign_in_transitions_once() {
        let (_db, provider, store) = setup();
        let mut gate = SessionGate::new(store.clone());
        gate.install(&provider);
        gate.poll();
        assert_eq!(gate.screen(), Screen::Auth);

        let flow = AuthFlow::new(&provider, &store);
        flow.sign_up("Ada", "ada@example.com", "secret1").unwrap();
        assert!(matches!(gate.poll(), Some(GateEvent::SignedIn { .. })));

        flow.sign_in("ada@example.com", "secret1").unwrap();
        match gate.poll() {
            Some(GateEvent::SignedIn {
                initialize_chat, ..
            }) => assert!(!initialize_chat),
            other => panic!("expected SignedIn, got {:?}", other),
        }

        assert_eq!(gate.screen(), Screen::Chat);
        assert_eq!(gate.chat_transitions(), 1);
        assert_eq!(gate.display_name(), Some("Ada"));
    }

    #[test]
    fn test_sign_out_returns_to_auth_and_clears_forms() {
        let (_db, provider, store) = setup();
        let mut gate = SessionGate::new(store.clone());
        gate.install(&provider);

        let flow = AuthFlow::new(&provider, &store);
        flow.sign_up("Ada", "ada@example.com", "secret1").unwrap();
        gate.poll();

        gate.forms_mut().email = "typed@example.com".to_string();
        flow.sign_out().unwrap();

        assert_eq!(gate.poll(), Some(GateEvent::SignedOut));
        assert_eq!(gate.screen(), Screen::Auth);
        assert_eq!(gate.forms(), &AuthForms::default());
        assert!(gate.identity().is_none());
    }

    #[test]
    fn test_missing_profile_is_created() {
        let (_db, _provider, store) = setup();
        let mut gate = SessionGate::new(store.clone());

        let identity = Identity {
            uid: "u1".to_string(),
            email: "grace@example.com".to_string(),
            display_name: Some("Grace".to_string()),
        };
        let event = gate.handle(Some(identity));
        match event {
            GateEvent::SignedIn {
                display_name,
                initialize_chat,
                ..
            } => {
                assert_eq!(display_name, "Grace");
                assert!(initialize_chat);
            }
            other => panic!("expected SignedIn, got {:?}", other),
        }

        let profile = store.profile("u1").unwrap().unwrap();
        assert_eq!(profile.name, "Grace");
        assert_eq!(profile.email, "grace@example.com");
    }

    /// Store whose every operation fails
    struct BrokenStore;

    impl DocumentStore for BrokenStore {
        fn read(&self, _: &str) -> Result<Option<Document>> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn write(&self, _: &str, _: &Value) -> Result<()> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn update(&self, _: &str, _: &Value) -> Result<()> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn push(&self, _: &str, _: &Value) -> Result<String> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn compare_and_swap(&self, _: &str, _: i64, _: &Value) -> Result<bool> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn children(&self, _: &str) -> Result<Vec<Document>> {
            Err(Error::Validation("store offline".to_string()))
        }
        fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
            broadcast::channel(1).1
        }
    }

    #[test]
    fn test_store_failure_degrades_to_email() {
        let store = ConversationStore::new(Arc::new(BrokenStore));
        let mut gate = SessionGate::new(store);

        let identity = Identity {
            uid: "u1".to_string(),
            email: "grace@example.com".to_string(),
            display_name: Some("Grace".to_string()),
        };
        gate.handle(Some(identity));

        assert_eq!(gate.screen(), Screen::Chat);
        assert_eq!(gate.display_name(), Some("grace@example.com"));
    }

    #[test]
    fn test_form_validation_messages() {
        let (_db, provider, store) = setup();
        let flow = AuthFlow::new(&provider, &store);

        let err = flow.sign_up("", "ada@example.com", "secret1").unwrap_err();
        assert_eq!(
            describe_auth_failure(AuthAction::SignUp, &err),
            "Please fill in all fields"
        );

        let err = flow.sign_up("Ada", "ada@example.com", "12345").unwrap_err();
        assert_eq!(
            describe_auth_failure(AuthAction::SignUp, &err),
            "Password must be at least 6 characters long"
        );

        let err = flow.sign_in("ada@example.com", "").unwrap_err();
        assert_eq!(
            describe_auth_failure(AuthAction::SignIn, &err),
            "Please enter both email and password"
        );
    }

    #[test]
    fn test_provider_errors_get_prefix() {
        let (_db, provider, store) = setup();
        let flow = AuthFlow::new(&provider, &store);
        flow.sign_up("Ada", "ada@example.com", "secret1").unwrap();

        let err = flow.sign_in("ada@example.com", "nope-nope").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::WrongPassword)));
        assert_eq!(
            describe_auth_failure(AuthAction::SignIn, &err),
            "Login failed. Incorrect password."
        );

        let err = flow
            .sign_up("Ada", "ada@example.com", "secret1")
            .unwrap_err();
        assert_eq!(
            describe_auth_failure(AuthAction::SignUp, &err),
            "Error creating account. This email is already registered."
        );
    }

    #[test]
    fn test_sign_in_updates_last_login() {
        let (_db, provider, store) = setup();
        let flow = AuthFlow::new(&provider, &store);
        let identity = flow.sign_up("Ada", "ada@example.com", "secret1").unwrap();
        let before = store.profile(&identity.uid).unwrap().unwrap().last_login;

        std::thread::sleep(std::time::Duration::from_millis(5));
        flow.sign_in("ada@example.com", "secret1").unwrap();

        let after = store.profile(&identity.uid).unwrap().unwrap();
        assert!(after.last_login > before);
        assert_eq!(after.name, "Ada");
    }
}
