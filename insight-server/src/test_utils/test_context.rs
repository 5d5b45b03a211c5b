//! Helpers for running isolated webserver instances
use crate::{
    app_state::{AppState, AppStateBuilder},
    router::setup_app_router,
    setups::test::{TestSetup, TestUserStore, TestVerificationCodeSender},
};
use anyhow::Result;
use axum::Router;

/// An app router on top of an in-memory user store and a recording code sender
#[derive(Debug)]
pub struct TestContext {
    app: Router,
    app_state: AppState<TestSetup>,
}

impl TestContext {
    /// Create a new test context
    pub fn new() -> Result<Self> {
        Self::new_with_state(|builder| builder)
    }

    /// Create a new test context, customizing the state before it's finalized
    pub fn new_with_state<F>(f: F) -> Result<Self>
    where
        F: FnOnce(AppStateBuilder<TestSetup>) -> AppStateBuilder<TestSetup>,
    {
        let builder = AppStateBuilder::default()
            .with_user_store(TestUserStore::default())
            .with_verification_code_sender(TestVerificationCodeSender::default());

        let app_state = f(builder).finalize()?;

        let app = setup_app_router(app_state.clone());

        Ok(Self { app, app_state })
    }

    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn user_store(&self) -> &TestUserStore {
        &self.app_state.user_store
    }

    pub fn verification_code_sender(&self) -> &TestVerificationCodeSender {
        &self.app_state.verification_code_sender
    }

    pub fn app_state(&self) -> &AppState<TestSetup> {
        &self.app_state
    }
}
