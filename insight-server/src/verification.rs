//! Email verification code lifecycle: issuing, resending and checking codes.

use crate::{
    app_state::AppState,
    models::user::{UserPatch, UserRecord},
    settings,
    setups::{ServerSetup, StoreError, UserStore, VerificationCodeSender},
};
use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use insight_core::verification::{check_code, CodeRejection, VerificationCode};
use metrics::increment_counter;
use tracing::{debug, info, warn};

/// Everything that can go wrong while issuing or checking a code.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// There is no account with the given username
    #[error("no account with that username")]
    NotFound,
    /// The account already proved ownership of its email
    #[error("account is already verified")]
    AlreadyVerified,
    /// The stored code is past its expiry
    #[error("verification code has expired")]
    CodeExpired,
    /// The submitted code isn't the stored one
    #[error("incorrect verification code")]
    CodeMismatch,
    /// A code was issued too recently
    #[error("a code was sent recently, retry in {}s", retry_after.num_seconds())]
    ResendTooSoon {
        /// Time left until a new code may be issued
        retry_after: Duration,
    },
    /// The code was persisted, but couldn't be delivered
    #[error("failed to deliver verification code: {0}")]
    DeliveryFailed(#[source] anyhow::Error),
    /// The user store failed
    #[error("user store failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<StoreError> for VerificationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            err @ StoreError::Conflict { .. } => Self::Persistence(err.into()),
            StoreError::Backend(err) => Self::Persistence(err),
        }
    }
}

impl From<CodeRejection> for VerificationError {
    fn from(rejection: CodeRejection) -> Self {
        match rejection {
            CodeRejection::Expired => Self::CodeExpired,
            CodeRejection::Mismatch => Self::CodeMismatch,
        }
    }
}

/// Why a code is being issued. Only used for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueTrigger {
    /// Sign-up, including sign-up on a pending email
    SignUp,
    /// An explicit resend request
    Resend,
}

impl IssueTrigger {
    fn as_label(self) -> &'static str {
        match self {
            Self::SignUp => "sign_up",
            Self::Resend => "resend",
        }
    }
}

/// Issues, resends and checks verification codes for accounts in the
/// user store, delivering them with the configured sender.
///
/// Every operation takes `now` explicitly. Nothing here reads the clock.
pub struct VerificationLifecycle<'a, S: ServerSetup> {
    user_store: &'a S::UserStore,
    sender: &'a S::VerificationCodeSender,
    policy: &'a settings::Verification,
}

impl<S: ServerSetup> std::fmt::Debug for VerificationLifecycle<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationLifecycle")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a, S: ServerSetup> VerificationLifecycle<'a, S> {
    /// Borrow the collaborators from the app state
    pub fn new(state: &'a AppState<S>) -> Self {
        Self {
            user_store: &state.user_store,
            sender: &state.verification_code_sender,
            policy: &state.verification,
        }
    }

    /// A fresh, uniformly random six digit code
    pub fn generate_code() -> VerificationCode {
        VerificationCode::generate()
    }

    /// Bind `code` to the account and send it to the account's email.
    ///
    /// The code is persisted before delivery is attempted. A delivery failure
    /// is reported, but the new code stays in place.
    pub async fn issue(
        &self,
        username: &str,
        code: &VerificationCode,
        trigger: IssueTrigger,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let expires_at = now.checked_add_signed(self.policy.code_ttl()).ok_or_else(|| {
            VerificationError::Persistence(anyhow!("code_ttl_secs overflows the expiry timestamp"))
        })?;
        let user = self
            .user_store
            .update(
                username,
                UserPatch::issue_code(code.as_str(), now, expires_at),
            )
            .await?;

        increment_counter!("verification_codes_issued_total", "trigger" => trigger.as_label());

        if let Err(err) = self.sender.send_code(&user.email, code.as_str()).await {
            warn!(username, %err, "Failed to deliver verification code");
            return Err(VerificationError::DeliveryFailed(err));
        }

        info!(username, %expires_at, trigger = trigger.as_label(), "Issued verification code");

        Ok(())
    }

    /// Replace the account's code with a fresh one and send it.
    pub async fn resend(&self, username: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        let user = self
            .user_store
            .find_by_username(username)
            .await?
            .ok_or(VerificationError::NotFound)?;

        if user.verified {
            return Err(VerificationError::AlreadyVerified);
        }

        self.reissue(&user, IssueTrigger::Resend, now).await
    }

    /// Issue a fresh code to an account that already holds one, once the
    /// resend cooldown since its last issuance has passed.
    pub async fn reissue(
        &self,
        user: &UserRecord,
        trigger: IssueTrigger,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        self.check_cooldown(user, now)?;

        self.issue(&user.username, &Self::generate_code(), trigger, now)
            .await
    }

    fn check_cooldown(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<(), VerificationError> {
        let cooldown = self.policy.resend_cooldown();
        if cooldown <= Duration::zero() {
            return Ok(());
        }

        let Some(issued_at) = user.verify_code_issued_at else {
            return Ok(());
        };

        let allowed_at = issued_at.checked_add_signed(cooldown).ok_or_else(|| {
            VerificationError::Persistence(anyhow!(
                "resend_cooldown_secs overflows the cooldown timestamp"
            ))
        })?;

        if now < allowed_at {
            debug!(username = %user.username, %allowed_at, "Code requested during cooldown");
            return Err(VerificationError::ResendTooSoon {
                retry_after: allowed_at - now,
            });
        }

        Ok(())
    }

    /// Check `submitted` against the account's code and mark the account
    /// verified on a match. The stored code is consumed on success.
    pub async fn verify(
        &self,
        username: &str,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let Some(user) = self.user_store.find_by_username(username).await? else {
            increment_counter!("verification_attempts_total", "outcome" => "not_found");
            return Err(VerificationError::NotFound);
        };

        if let Err(rejection) = check_code(
            user.verify_code.as_deref(),
            user.verify_code_expires_at,
            submitted,
            now,
        ) {
            let outcome = match rejection {
                CodeRejection::Expired => "expired",
                CodeRejection::Mismatch => "mismatch",
            };
            increment_counter!("verification_attempts_total", "outcome" => outcome);
            info!(username, outcome, "Rejected verification code");

            return Err(rejection.into());
        }

        self.user_store
            .update(username, UserPatch::mark_verified())
            .await?;

        increment_counter!("verification_attempts_total", "outcome" => "verified");
        info!(username, "Account verified");

        Ok(())
    }
}
