use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::config::{AppConfig, API_KEY_ENV};
use crate::models::{Session, User};
use crate::providers::{CompletionProvider, OpenAiProvider};
use crate::services::auth::{self, AuthError};
use crate::services::title;
use crate::services::{
    AdminService, Authenticator, ChatService, Clock, ConversationStore, Database,
    DirectoryAuthenticator, HistoryBrowser, KeyringService, SystemClock, TimeFormatter,
};

/// Every service the front end talks to, wired from one config.
pub struct App {
    pub db: Database,
    pub chat: ChatService,
    pub history: HistoryBrowser,
    pub admin: AdminService,
    pub clock: Arc<dyn Clock>,
    pub formatter: TimeFormatter,
    authenticator: Arc<dyn Authenticator>,
}

impl App {
    /// Build against the real OpenAI-compatible endpoint.
    pub async fn build(config: &AppConfig, db: Database) -> Result<Self> {
        let api_key = resolve_api_key(config).await?;
        let provider = OpenAiProvider::new(&config.provider.base_url, api_key)?;
        tracing::info!(
            "Using provider at {} with model {}",
            provider.endpoint(),
            config.provider.model
        );
        Self::with_provider(config, db, Arc::new(provider), Arc::new(SystemClock))
    }

    pub fn with_provider(
        config: &AppConfig,
        db: Database,
        provider: Arc<dyn CompletionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let formatter = TimeFormatter::new(config.session.timezone()?);
        let timeout = config.session.timeout()?;
        let titles = title::build_strategy(
            &config.titles,
            provider.clone(),
            &config.provider.model,
            formatter,
        );
        let store = ConversationStore::new(db.clone(), titles);
        let chat = ChatService::new(
            provider,
            store,
            clock.clone(),
            config.chat.clone(),
            config.provider.model.clone(),
            timeout,
        );
        tracing::debug!("Stage transition policy: {:?}", chat.policy());
        let history = HistoryBrowser::new(
            db.clone(),
            config.session.page_size,
            Duration::from_secs(config.history.cache_ttl_secs),
        );
        let authenticator = Arc::new(DirectoryAuthenticator::new(db.clone()));

        Ok(Self {
            admin: AdminService::new(db.clone(), formatter),
            db,
            chat,
            history,
            clock,
            formatter,
            authenticator,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        auth::login(
            self.authenticator.as_ref(),
            &self.db,
            self.clock.as_ref(),
            email,
            password,
        )
        .await
    }

    pub async fn is_admin(&self, user: &User) -> bool {
        self.admin.is_admin(&user.email).await
    }
}

/// Environment, then config file, then the system keyring.
pub async fn resolve_api_key(config: &AppConfig) -> Result<String> {
    if let Some(key) = config.api_key_from_env_or_file() {
        return Ok(key);
    }

    match KeyringService::new().await {
        Ok(keyring) => match keyring.api_key().await {
            Ok(Some(key)) => return Ok(key),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read API key from keyring: {:#}", e),
        },
        Err(e) => tracing::warn!("Keyring unavailable: {:#}", e),
    }

    bail!(
        "No API key configured. Set {}, add provider.api_key to the config, or run `ewa set-api-key`",
        API_KEY_ENV
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;

    fn build(config: &AppConfig) -> Result<App> {
        App::with_provider(
            config,
            Database::new_in_memory().unwrap(),
            Arc::new(ScriptedProvider::new("ok")),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_invalid_session_settings_fail_startup() {
        assert!(build(&AppConfig::default()).is_ok());

        let mut zero = AppConfig::default();
        zero.session.timeout_secs = 0;
        assert!(build(&zero).is_err());

        let mut huge = AppConfig::default();
        huge.session.timeout_secs = u64::MAX;
        assert!(build(&huge).is_err());

        let mut zone = AppConfig::default();
        zone.session.timezone = "Nowhere/Special".to_string();
        assert!(build(&zone).is_err());
    }
}
