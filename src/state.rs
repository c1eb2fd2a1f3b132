use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{AccountBackend, Config, DEFAULT_TOKEN_SECRET};
use crate::constants::samples;
use crate::db::{PostRepository, Store, UserRepository};
use crate::models::post::PostDraft;
use crate::services::{
    AccountError, AccountStore, IdentityVerifier, InMemoryAccountStore, RemoteAuthDelegate,
    SeaOrmAccountStore, TokenService,
};

/// Shared HTTP client for calls to other services. The timeout bounds every
/// request including reading the body.
fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("inkpost/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

fn token_service(config: &Config) -> TokenService {
    if config.tokens.secret == DEFAULT_TOKEN_SECRET {
        tracing::warn!("Using the built-in token secret; set TOKEN_SECRET for real deployments");
    }
    TokenService::new(&config.tokens.secret, config.tokens.ttl_minutes)
}

#[derive(Clone)]
pub struct BlogState {
    pub posts: PostRepository,

    pub accounts: Arc<dyn AccountStore>,

    pub verifier: Arc<dyn IdentityVerifier>,

    pub tokens: TokenService,

    pub cors_allowed_origins: Vec<String>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl BlogState {
    pub fn new(
        config: &Config,
        store: &Store,
        prometheus_handle: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let http_client =
            build_http_client(Duration::from_secs(config.blog.verify_timeout_seconds))?;
        let verifier = RemoteAuthDelegate::new(http_client, &config.blog.auth_service_url)?;
        info!(url = %verifier.verify_url(), "Delegating token verification");

        let accounts: Arc<dyn AccountStore> = match config.blog.accounts {
            AccountBackend::Memory => Arc::new(InMemoryAccountStore::new()),
            AccountBackend::Database => Arc::new(SeaOrmAccountStore::new(store.users())),
        };

        let mut state = Self::with_components(
            store.posts(),
            accounts,
            Arc::new(verifier),
            token_service(config),
        );
        state.cors_allowed_origins = config.blog.cors_allowed_origins.clone();
        state.prometheus_handle = prometheus_handle;
        Ok(state)
    }

    #[must_use]
    pub fn with_components(
        posts: PostRepository,
        accounts: Arc<dyn AccountStore>,
        verifier: Arc<dyn IdentityVerifier>,
        tokens: TokenService,
    ) -> Self {
        Self {
            posts,
            accounts,
            verifier,
            tokens,
            cors_allowed_origins: Vec::new(),
            prometheus_handle: None,
        }
    }

    /// Sample accounts and posts for a fresh installation. Safe to run on
    /// every start: existing accounts are kept and posts are only added to
    /// an empty table.
    pub async fn seed_sample_data(&self) -> anyhow::Result<()> {
        for (username, password) in samples::ACCOUNTS {
            match self.accounts.register(username, password).await {
                Ok(()) | Err(AccountError::Duplicate) => {}
                Err(e) => return Err(e).context("Failed to seed sample account"),
            }
        }

        let drafts = samples::POSTS
            .iter()
            .map(|(title, author, content)| PostDraft::new(*title, *content, *author))
            .collect::<Result<Vec<_>, _>>()
            .context("Sample post is invalid")?;

        let inserted = self
            .posts
            .ensure_seed_data(drafts)
            .await
            .context("Failed to seed sample posts")?;
        let post_count = self.posts.count().await?;
        let account_count = self.accounts.count().await?;

        info!(inserted, post_count, account_count, "Sample data ready");
        Ok(())
    }
}

#[derive(Clone)]
pub struct UserServiceState {
    pub users: UserRepository,

    pub tokens: TokenService,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl UserServiceState {
    #[must_use]
    pub fn new(config: &Config, store: &Store, prometheus_handle: Option<PrometheusHandle>) -> Self {
        let mut state = Self::with_components(store.users(), token_service(config));
        state.prometheus_handle = prometheus_handle;
        state
    }

    #[must_use]
    pub fn with_components(users: UserRepository, tokens: TokenService) -> Self {
        Self {
            users,
            tokens,
            prometheus_handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_store;

    #[tokio::test]
    async fn test_seeding_is_repeatable() {
        let store = memory_store().await;
        let state = BlogState::new(&Config::default(), &store, None).unwrap();

        state.seed_sample_data().await.unwrap();
        state.seed_sample_data().await.unwrap();

        assert_eq!(state.posts.count().await.unwrap(), samples::POSTS.len() as u64);
        assert_eq!(state.accounts.count().await.unwrap(), samples::ACCOUNTS.len() as u64);
        assert!(state.accounts.verify("admin", "password123").await.unwrap());
    }

    #[tokio::test]
    async fn test_database_account_backend() {
        let store = memory_store().await;
        let mut config = Config::default();
        config.blog.accounts = AccountBackend::Database;

        let state = BlogState::new(&config, &store, None).unwrap();
        state.seed_sample_data().await.unwrap();

        assert!(store.users().get_by_username("dev").await.unwrap().is_some());
    }
}
