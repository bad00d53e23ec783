//! Identity provider seam and the local SQLite-backed implementation.
//!
//! Providers report failures as [`AuthError`] codes (the same vocabulary
//! hosted identity services use, e.g. `auth/wrong-password`), each with a
//! fixed user-facing explanation. Auth state is published on a
//! [`tokio::sync::watch`] channel so a session gate can follow sign-in and
//! sign-out without polling.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;

use crate::db::{AccountRecord, Database};
use crate::types::Identity;

/// Shortest password accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity provider failures, one variant per provider error code.
///
/// `Display` is the user-facing explanation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("This email is already registered.")]
    EmailAlreadyInUse,
    #[error("Invalid email address.")]
    InvalidEmail,
    #[error("Password is too weak.")]
    WeakPassword,
    #[error("Email/password accounts are not enabled. Please contact support.")]
    OperationNotAllowed,
    #[error("This account has been disabled.")]
    UserDisabled,
    #[error("No account found with this email. Please sign up first.")]
    UserNotFound,
    #[error("Incorrect password.")]
    WrongPassword,
    #[error("Invalid email or password. Please check your credentials.")]
    InvalidCredentials,
    #[error("Too many failed attempts. Please try again later.")]
    TooManyRequests,
    #[error("Network error. Please check your internet connection.")]
    NetworkRequestFailed,
    #[error("{message}")]
    Other { code: String, message: String },
}

impl AuthError {
    /// Provider error code for this failure
    pub fn code(&self) -> &str {
        match self {
            AuthError::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::WeakPassword => "auth/weak-password",
            AuthError::OperationNotAllowed => "auth/operation-not-allowed",
            AuthError::UserDisabled => "auth/user-disabled",
            AuthError::UserNotFound => "auth/user-not-found",
            AuthError::WrongPassword => "auth/wrong-password",
            AuthError::InvalidCredentials => "auth/invalid-login-credentials",
            AuthError::TooManyRequests => "auth/too-many-requests",
            AuthError::NetworkRequestFailed => "auth/network-request-failed",
            AuthError::Other { code, .. } => code,
        }
    }

    /// Map a provider error code back to a variant
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "auth/email-already-in-use" => AuthError::EmailAlreadyInUse,
            "auth/invalid-email" => AuthError::InvalidEmail,
            "auth/weak-password" => AuthError::WeakPassword,
            "auth/operation-not-allowed" => AuthError::OperationNotAllowed,
            "auth/user-disabled" => AuthError::UserDisabled,
            "auth/user-not-found" => AuthError::UserNotFound,
            "auth/wrong-password" => AuthError::WrongPassword,
            "auth/invalid-login-credentials" => AuthError::InvalidCredentials,
            "auth/too-many-requests" => AuthError::TooManyRequests,
            "auth/network-request-failed" => AuthError::NetworkRequestFailed,
            _ => AuthError::Other {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "Identity store failure");
        AuthError::Other {
            code: "auth/internal-error".to_string(),
            message: e.to_string(),
        }
    }
}

/// An authentication backend.
pub trait IdentityProvider: Send + Sync {
    /// Register an account and sign it in
    fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Sign in an existing account
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Sign out whoever is signed in
    fn sign_out(&self) -> Result<(), AuthError>;

    /// Currently signed-in identity, if any
    fn current(&self) -> Option<Identity>;

    /// Auth-state stream; the receiver starts at the current state
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// Accounts stored in the local colloquy database.
///
/// Passwords are kept as Argon2id PHC strings.
pub struct LocalIdentityProvider {
    db: Arc<Database>,
    state: watch::Sender<Option<Identity>>,
}

impl LocalIdentityProvider {
    pub fn new(db: Arc<Database>) -> Self {
        let (state, _) = watch::channel(None);
        Self { db, state }
    }

    fn publish(&self, identity: Option<Identity>) {
        self.state.send_replace(identity);
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if self
            .db
            .get_account_by_email(email)
            .map_err(AuthError::internal)?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyInUse);
        }

        let account = AccountRecord {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: Some(name.trim().to_string()).filter(|n| !n.is_empty()),
            password_hash: hash_password(password)?,
            disabled: false,
            created_at: Utc::now(),
        };
        self.db
            .insert_account(&account)
            .map_err(AuthError::internal)?;

        tracing::info!(uid = %account.uid, "Account created");

        let identity = Identity {
            uid: account.uid,
            email: account.email,
            display_name: account.display_name,
        };
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(AuthError::InvalidEmail);
        }

        let account = self
            .db
            .get_account_by_email(email)
            .map_err(AuthError::internal)?
            .ok_or(AuthError::UserNotFound)?;

        if account.disabled {
            return Err(AuthError::UserDisabled);
        }

        if !verify_password(password, &account.password_hash)? {
            tracing::info!(uid = %account.uid, "Rejected sign-in with wrong password");
            return Err(AuthError::WrongPassword);
        }

        let identity = Identity {
            uid: account.uid,
            email: account.email,
            display_name: account.display_name,
        };
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.publish(None);
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }
}

/// Argon2id with a fresh random salt, as a PHC string
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(AuthError::internal)
}

fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(AuthError::internal)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Cheap shape check; the provider is the authority on real validity.
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}
