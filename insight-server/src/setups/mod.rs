//! This abstracts insight server side-effects into "setups".
//!
//! This module defines the traits, submodules define test, local & production
//! collections of implementations.
use crate::models::user::{NewUser, UserPatch, UserRecord};
use anyhow::Result;
use async_trait::async_trait;

pub mod local;
pub mod prod;

/// This trait groups type parameters to the server's `AppState` struct.
///
/// It captures the setup of the server, distinguishing between e.g.
/// unit testing & production setups.
pub trait ServerSetup: Clone + Send + Sync + 'static {
    /// Where user accounts are persisted
    type UserStore: UserStore;
    /// Which implementation to use to send verification codes
    type VerificationCodeSender: VerificationCodeSender;
}

/// Errors surfaced by a [`UserStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique column already holds the value
    #[error("{field} is already taken")]
    Conflict {
        /// The conflicting column
        field: UniqueField,
    },
    /// No account with the given username
    #[error("no account found")]
    NotFound,
    /// The backend failed
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Columns with a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// `users.username`
    Username,
    /// `users.email`
    Email,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username => write!(f, "username"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Persistence for user accounts.
///
/// Every call is atomic on its own. There are no multi-call transactions, so
/// concurrent updates to the same account resolve as last-write-wins.
#[async_trait]
pub trait UserStore: Clone + Send + Sync + 'static {
    /// Look up an account by its exact (case-sensitive) username
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Look up an account by email address
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create an account. Fails with [`StoreError::Conflict`] if the username
    /// or email is taken.
    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Apply a patch to the account with the given username and return the
    /// updated record. Fails with [`StoreError::NotFound`] if there is none.
    async fn update(&self, username: &str, patch: UserPatch) -> Result<UserRecord, StoreError>;

    /// Check that the store is reachable
    async fn healthcheck(&self) -> Result<()>;
}

/// The service that sends account verification codes
#[async_trait]
pub trait VerificationCodeSender: Clone + Send + Sync + 'static {
    /// Send the code associated with the email
    async fn send_code(&self, email: &str, code: &str) -> Result<()>;
}
