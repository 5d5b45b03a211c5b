//! The Axum Application State

use crate::{settings, setups::ServerSetup};
use anyhow::{anyhow, Result};
use std::sync::Arc;

#[derive(Clone)]
/// Global application route state.
pub struct AppState<S: ServerSetup> {
    /// Where user accounts are persisted
    pub user_store: S::UserStore,
    /// The service that sends account verification codes
    pub verification_code_sender: S::VerificationCodeSender,
    /// Code lifetime & resend policy
    pub verification: Arc<settings::Verification>,
}

impl<S: ServerSetup> AppState<S> {
    /// Start building an [`AppState`]
    pub fn builder() -> AppStateBuilder<S> {
        AppStateBuilder::default()
    }
}

/// Builder for [`AppState`]
#[derive(Debug)]
pub struct AppStateBuilder<S: ServerSetup> {
    user_store: Option<S::UserStore>,
    verification_code_sender: Option<S::VerificationCodeSender>,
    verification: Option<settings::Verification>,
}

impl<S: ServerSetup> Default for AppStateBuilder<S> {
    fn default() -> Self {
        Self {
            user_store: None,
            verification_code_sender: None,
            verification: None,
        }
    }
}

impl<S: ServerSetup> AppStateBuilder<S> {
    /// Finalize the builder and return the [`AppState`]
    pub fn finalize(self) -> Result<AppState<S>> {
        let user_store = self
            .user_store
            .ok_or_else(|| anyhow!("user_store is required"))?;

        let verification_code_sender = self
            .verification_code_sender
            .ok_or_else(|| anyhow!("verification_code_sender is required"))?;

        let verification = Arc::new(self.verification.unwrap_or_default());

        Ok(AppState {
            user_store,
            verification_code_sender,
            verification,
        })
    }

    /// Set the user store
    pub fn with_user_store(mut self, user_store: S::UserStore) -> Self {
        self.user_store = Some(user_store);
        self
    }

    /// Set the service that sends account verification codes
    pub fn with_verification_code_sender(
        mut self,
        verification_code_sender: S::VerificationCodeSender,
    ) -> Self {
        self.verification_code_sender = Some(verification_code_sender);
        self
    }

    /// Set the verification code settings. Defaults apply if never called.
    pub fn with_verification(mut self, verification: settings::Verification) -> Self {
        self.verification = Some(verification);
        self
    }
}

impl<S> std::fmt::Debug for AppState<S>
where
    S: ServerSetup,
    S::UserStore: std::fmt::Debug,
    S::VerificationCodeSender: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("user_store", &self.user_store)
            .field("verification_code_sender", &self.verification_code_sender)
            .field("verification", &self.verification)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setups::test::{TestSetup, TestUserStore, TestVerificationCodeSender};
    use testresult::TestResult;

    #[test]
    fn test_builder_requires_collaborators() {
        let result = AppState::<TestSetup>::builder()
            .with_user_store(TestUserStore::default())
            .finalize();

        assert!(result.is_err());
    }

    #[test]
    fn test_builder_defaults_verification_settings() -> TestResult {
        let state = AppState::<TestSetup>::builder()
            .with_user_store(TestUserStore::default())
            .with_verification_code_sender(TestVerificationCodeSender::default())
            .finalize()?;

        assert_eq!(*state.verification, settings::Verification::default());

        Ok(())
    }
}
