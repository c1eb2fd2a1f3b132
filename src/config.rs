use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::db::RetryPolicy;

/// Signing secret used when nothing else is configured. Fine for local runs only.
pub const DEFAULT_TOKEN_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub database: DatabaseConfig,

    pub bootstrap: BootstrapConfig,

    pub blog: BlogConfig,

    pub users: UsersConfig,

    pub tokens: TokenConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// 0 keeps the tokio default (one worker per core).
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL. Takes precedence over the individual fields below.
    pub url: Option<String>,

    pub host: String,

    pub port: u16,

    pub name: String,

    pub user: String,

    pub password: String,

    pub max_connections: u32,

    pub min_connections: u32,

    pub acquire_timeout_seconds: u64,

    /// Upper bound on units of work running at once, process-wide.
    pub max_concurrent_units: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            name: "inkpost".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 10,
            max_concurrent_units: 8,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<set>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_seconds", &self.acquire_timeout_seconds)
            .field("max_concurrent_units", &self.max_concurrent_units)
            .finish()
    }
}

impl DatabaseConfig {
    /// Private SQLite database living as long as the pool.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: Some("sqlite::memory:".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }

        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub max_attempts: u32,

    /// Sleep after attempt `n` is `backoff_seconds * n`.
    pub backoff_seconds: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_seconds: 3,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.backoff_seconds))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountBackend {
    #[default]
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    pub host: String,

    pub port: u16,

    /// Base URL of the user service. `/verify` is appended.
    pub auth_service_url: String,

    pub verify_timeout_seconds: u64,

    pub accounts: AccountBackend,

    pub seed_sample_data: bool,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8005,
            auth_service_url: "http://auth-service:8002".to_string(),
            verify_timeout_seconds: 5,
            accounts: AccountBackend::Memory,
            seed_sample_data: true,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    pub host: String,

    pub port: u16,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC secret shared by every service that issues or validates tokens.
    pub secret: String,

    pub ttl_minutes: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_TOKEN_SECRET.to_string(),
            ttl_minutes: 60,
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "inkpost".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    /// First config file found, then `.env`, then the process environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;

        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from: {}", path.display());
        }
        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("inkpost").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".inkpost").join("config.toml"));
        }
        paths
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(host) = var("DATABASE_HOST") {
            self.database.host = host;
        }
        if let Some(port) = var("DATABASE_PORT") {
            self.database.port = parse_port("DATABASE_PORT", &port)?;
        }
        if let Some(name) = var("DATABASE_NAME") {
            self.database.name = name;
        }
        if let Some(user) = var("DATABASE_USER") {
            self.database.user = user;
        }
        if let Some(password) = var("DATABASE_PASSWORD") {
            self.database.password = password;
        }
        if let Some(url) = var("AUTH_SERVICE_URL") {
            self.blog.auth_service_url = url;
        }
        if let Some(secret) = var("TOKEN_SECRET") {
            self.tokens.secret = secret;
        }
        if let Some(port) = var("BLOG_PORT") {
            self.blog.port = parse_port("BLOG_PORT", &port)?;
        }
        if let Some(port) = var("USER_SERVICE_PORT") {
            self.users.port = parse_port("USER_SERVICE_PORT", &port)?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.general.log_level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let auth_url = url::Url::parse(&self.blog.auth_service_url).with_context(|| {
            format!("Invalid auth service URL: {}", self.blog.auth_service_url)
        })?;
        if !matches!(auth_url.scheme(), "http" | "https") {
            anyhow::bail!("Auth service URL must use http or https");
        }

        if self.tokens.secret.trim().is_empty() {
            anyhow::bail!("Token secret cannot be empty");
        }
        if self.bootstrap.max_attempts == 0 {
            anyhow::bail!("bootstrap.max_attempts must be > 0");
        }
        if self.database.max_concurrent_units == 0 {
            anyhow::bail!("database.max_concurrent_units must be > 0");
        }
        if self.blog.verify_timeout_seconds == 0 {
            anyhow::bail!("blog.verify_timeout_seconds must be > 0");
        }

        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a port number, got {value:?}"))
}
