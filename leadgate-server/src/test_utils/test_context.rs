//! Helpers for running isolated webserver instances
use crate::{
    app_state::{AppState, AppStateBuilder},
    otp::SignedTokenBackend,
    router::setup_app_router,
    settings::{self, AppEnvironment},
    setups::test::{TestBotScoreVerifier, TestMailer, TestSetup},
};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;

/// Secret the test signing keys are derived from
pub const TEST_SIGNING_SECRET: &str = "leadgate test signing secret";

/// A reference to a leadgate server app in an isolated test environment
#[derive(Debug)]
pub struct TestContext {
    app: Router,
    app_state: AppState<TestSetup>,
}

impl TestContext {
    /// Create a new test context in the `dev` environment
    pub fn new() -> Result<Self> {
        Self::new_with_state(|builder| builder)
    }

    pub fn new_with_state<F>(f: F) -> Result<Self>
    where
        F: FnOnce(AppStateBuilder<TestSetup>) -> AppStateBuilder<TestSetup>,
    {
        let otp_settings = settings::Otp::default();

        let builder = AppStateBuilder::default()
            .with_environment(AppEnvironment::Dev)
            .with_otp_backend(Arc::new(SignedTokenBackend::new(
                TEST_SIGNING_SECRET,
                otp_settings.ttl(),
            )))
            .with_otp_settings(otp_settings)
            .with_mailer(TestMailer::default())
            .with_bot_score_verifier(TestBotScoreVerifier::default());

        let app_state = f(builder).finalize()?;

        let app = setup_app_router(app_state.clone());

        Ok(Self { app, app_state })
    }

    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn app_state(&self) -> &AppState<TestSetup> {
        &self.app_state
    }

    pub fn mailer(&self) -> &TestMailer {
        &self.app_state.mailer
    }

    pub fn bot_score_verifier(&self) -> &TestBotScoreVerifier {
        &self.app_state.bot_score_verifier
    }
}
