//! Server setup for local development

use super::{prod::PgUserStore, ServerSetup, VerificationCodeSender};
use anyhow::Result;
use async_trait::async_trait;

/// Implementation of `ServerSetup` for local environments.
/// Uses a real database, but never sends emails.
#[derive(Debug, Clone)]
pub struct LocalSetup;

impl ServerSetup for LocalSetup {
    type UserStore = PgUserStore;
    type VerificationCodeSender = LogCodeSender;
}

/// A `VerificationCodeSender` that doesn't actually send emails,
/// but instead logs the code via tracing.
#[derive(Debug, Clone, Default)]
pub struct LogCodeSender;

#[async_trait]
impl VerificationCodeSender for LogCodeSender {
    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        tracing::info!(email, code, "verification code (not sent, local setup)");
        Ok(())
    }
}
