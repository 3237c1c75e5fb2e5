//! Scheduler configuration.
//!
//! # Purpose
//! Resolves which store backs the session, how to reach Postgres, whether to
//! serve metrics, and whether to print the welcome banner.
//!
//! # Sources
//! Values are layered lowest to highest:
//! 1. built-in defaults ([`SchedulerConfig::default`])
//! 2. `SCHEDULER_*` environment variables ([`SchedulerConfig::from_env`])
//! 3. a YAML file named by `SCHEDULER_CONFIG` ([`SchedulerConfig::from_env_or_yaml`])
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Security notes
//! Database URLs may embed credentials; avoid logging them.
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Which [`SchedulerStore`](crate::store::SchedulerStore) implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

/// Connection settings for the Postgres backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// `postgres://` connection URL.
    pub url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Budget for establishing the pool at startup.
    pub connect_timeout_ms: u64,
    /// Budget for checking a connection out of the pool.
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    /// Settings for `url` with default pool sizing and timeouts.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_PG_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
        }
    }
}

// Scheduler configuration sourced from environment variables, optionally
// overlaid with a YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub metrics_bind: Option<SocketAddr>,
    pub show_banner: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            postgres: None,
            metrics_bind: None,
            show_banner: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerConfigOverride {
    storage: Option<StorageBackend>,
    database_url: Option<String>,
    pg_max_connections: Option<u32>,
    pg_connect_timeout_ms: Option<u64>,
    pg_acquire_timeout_ms: Option<u64>,
    metrics_bind: Option<String>,
    show_banner: Option<bool>,
}

impl SchedulerConfig {
    /// Read `SCHEDULER_*` variables over the defaults.
    ///
    /// Pool settings are only read when `SCHEDULER_DATABASE_URL` is set.
    ///
    /// # Errors
    /// - Any variable that is present but does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("SCHEDULER_STORAGE_BACKEND") {
            config.storage = value
                .parse()
                .with_context(|| "parse SCHEDULER_STORAGE_BACKEND")?;
        }
        if let Ok(url) = std::env::var("SCHEDULER_DATABASE_URL") {
            config.postgres = Some(PostgresConfig::with_url(url));
        }
        if let Some(pg) = config.postgres.as_mut() {
            if let Ok(value) = std::env::var("SCHEDULER_PG_MAX_CONNECTIONS") {
                pg.max_connections = value
                    .parse()
                    .with_context(|| "parse SCHEDULER_PG_MAX_CONNECTIONS")?;
            }
            if let Ok(value) = std::env::var("SCHEDULER_PG_ACQUIRE_TIMEOUT_MS") {
                pg.acquire_timeout_ms = value
                    .parse()
                    .with_context(|| "parse SCHEDULER_PG_ACQUIRE_TIMEOUT_MS")?;
            }
        }
        if let Ok(value) = std::env::var("SCHEDULER_METRICS_BIND") {
            config.metrics_bind = Some(
                value
                    .parse()
                    .with_context(|| "parse SCHEDULER_METRICS_BIND")?,
            );
        }
        if let Ok(value) = std::env::var("SCHEDULER_SHOW_BANNER") {
            config.show_banner = parse_bool(&value).with_context(|| "parse SCHEDULER_SHOW_BANNER")?;
        }
        Ok(config)
    }

    /// [`from_env`](Self::from_env), then the YAML file named by
    /// `SCHEDULER_CONFIG` when that variable is set.
    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("SCHEDULER_CONFIG") {
            config.apply_yaml_file(&path)?;
        }
        Ok(config)
    }

    /// Overlay the keys present in the YAML file at `path`.
    ///
    /// # Example
    /// ```yaml
    /// storage: postgres
    /// database_url: postgres://localhost/vaccines
    /// pg_max_connections: 4
    /// show_banner: false
    /// ```
    ///
    /// # Errors
    /// - The file cannot be read or is not valid YAML for these keys.
    pub fn apply_yaml_file(&mut self, path: &str) -> Result<()> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read scheduler config: {path}"))?;
        let override_cfg: SchedulerConfigOverride =
            serde_yaml::from_str(&contents).with_context(|| "parse scheduler config yaml")?;
        self.apply_override(override_cfg)
    }

    fn apply_override(&mut self, override_cfg: SchedulerConfigOverride) -> Result<()> {
        if let Some(storage) = override_cfg.storage {
            self.storage = storage;
        }
        if let Some(url) = override_cfg.database_url {
            match self.postgres.as_mut() {
                Some(pg) => pg.url = url,
                None => self.postgres = Some(PostgresConfig::with_url(url)),
            }
        }
        if let Some(pg) = self.postgres.as_mut() {
            if let Some(value) = override_cfg.pg_max_connections {
                pg.max_connections = value;
            }
            if let Some(value) = override_cfg.pg_connect_timeout_ms {
                pg.connect_timeout_ms = value;
            }
            if let Some(value) = override_cfg.pg_acquire_timeout_ms {
                pg.acquire_timeout_ms = value;
            }
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = Some(value.parse().with_context(|| "parse metrics_bind")?);
        }
        if let Some(value) = override_cfg.show_banner {
            self.show_banner = value;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other}"),
    }
}
