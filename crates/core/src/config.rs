use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub provisioner: ProvisionerConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            postgres: PostgresConfig::from_env(),
            provisioner: ProvisionerConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  provisioner: api_url={}, project={}",
            self.provisioner.api_url.as_deref().unwrap_or("(none)"),
            self.provisioner.project.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  dispatch:    interval={}min, poll={}s",
            self.dispatch.interval_minutes,
            self.dispatch.poll_seconds
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("CADENCE_HOST", "0.0.0.0"),
            port: env_u16("CADENCE_PORT", 8080),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub database: String,
}

impl PostgresConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("PG_HOST", ""),
            port: env_u16("PG_PORT", 5432),
            user: env_or("PG_USER", "postgres"),
            password: env_opt("PG_PASSWORD"),
            database: env_or("PG_DATABASE", "cadence"),
        }
    }

    /// A host must be set for the Postgres repository to be used.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    /// Connection URL for sqlx.
    pub fn url(&self) -> String {
        let password = self
            .password
            .as_deref()
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        format!(
            "postgres://{}{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.database
        )
    }
}

// ── Provisioner ───────────────────────────────────────────────

/// Settings for the external infrastructure-provisioning API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Base URL of the provisioning API. When unset, dispatches are
    /// logged instead of sent (local/dev mode).
    pub api_url: Option<String>,
    /// Project the provisioned deployments belong to.
    pub project: Option<String>,
    /// Optional prefix prepended to every provisioned deployment name.
    pub name_prefix: String,
    /// Request timeout for apply/remove calls.
    pub timeout_secs: u64,
}

impl ProvisionerConfig {
    fn from_env() -> Self {
        Self {
            api_url: env_opt("PROVISIONER_API_URL"),
            project: env_opt("PROVISIONER_PROJECT"),
            name_prefix: env_or("PROVISIONER_NAME_PREFIX", ""),
            timeout_secs: env_u64("PROVISIONER_TIMEOUT_SECS", 60),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.project.is_some()
    }
}

// ── Dispatch ──────────────────────────────────────────────────

/// Settings for the periodic trigger-evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Width of the dispatch window in minutes. An occurrence within
    /// `interval/2` minutes of "now" on either side is actionable.
    pub interval_minutes: u32,
    /// Seconds between evaluation passes.
    pub poll_seconds: u64,
}

impl DispatchConfig {
    fn from_env() -> Self {
        Self {
            interval_minutes: env_u32("DISPATCH_INTERVAL_MINUTES", 10),
            poll_seconds: env_u64("DISPATCH_POLL_SECONDS", 600),
        }
    }
}
