//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults
//! 2. User config: `~/.config/visit-backfill/config.toml` (XDG) or platform config dir
//! 3. Project config: `.visit-backfill.toml`
//! 4. Environment variables: `VISIT_BACKFILL_*`, nested keys separated by `__`
//!    (e.g. `VISIT_BACKFILL_MIGRATION__BATCH_SIZE=100`)
//!
//! # Example
//!
//! ```toml
//! [firestore]
//! project_id = "my-project"
//!
//! [migration]
//! transport = "patch"
//!
//! [credentials]
//! path = "/secrets/service-account.json"
//! ```

use std::ops::Deref;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Project the migration was written for.
pub const DEFAULT_PROJECT_ID: &str = "cement-delivery-tracker-72de2";

/// Firestore rejects commits with more writes than this.
pub const MAX_BATCH_SIZE: usize = 500;

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub firestore: FirestoreConfig,
    pub migration: MigrationConfig,
    pub credentials: CredentialsConfig,
}

/// Firestore REST endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FirestoreConfig {
    /// Google Cloud project id. Falls back to the service-account key's
    /// `project_id` when unset.
    pub project_id: Option<String>,
    /// Firestore database id.
    pub database: String,
    /// REST API root, overridable for the emulator.
    pub base_url: String,
    /// Documents requested per page when listing a collection.
    pub page_size: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: Some(DEFAULT_PROJECT_ID.to_string()),
            database: "(default)".to_string(),
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            page_size: 300,
            timeout_secs: 30,
        }
    }
}

/// Which backend carries the writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One atomic `documents:commit` request per batch.
    #[default]
    Commit,
    /// One `PATCH` request per document, sent when the batch is committed.
    Patch,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Commit => f.write_str("commit"),
            Transport::Patch => f.write_str("patch"),
        }
    }
}

/// Migration parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub visits_collection: String,
    pub users_collection: String,
    pub batch_size: usize,
    pub transport: Transport,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            visits_collection: "visits".to_string(),
            users_collection: "users".to_string(),
            batch_size: MAX_BATCH_SIZE,
            transport: Transport::default(),
        }
    }
}

/// Credential overrides. Both are optional; see [`crate::credentials`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Explicit path to a service-account or authorized-user JSON file.
    pub path: Option<PathBuf>,
    /// Pre-minted bearer token; skips credential discovery entirely.
    pub access_token: Option<String>,
}

impl Config {
    /// Load config with layered resolution (defaults → user → project → env)
    /// and validate it.
    pub fn load() -> Result<Self, AppError> {
        Self::resolve(Self::figment())
    }

    /// Extract from `figment`, then validate.
    pub fn resolve(figment: Figment) -> Result<Self, AppError> {
        let config = Self::from_figment(figment)?;
        config.validate()?;
        Ok(config)
    }

    /// The figment used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file(".visit-backfill.toml"))
            .merge(Env::prefixed("VISIT_BACKFILL_").split("__"))
    }

    /// Extract a config from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(ConfigError::from)
    }

    /// Check the values the runner depends on.
    pub fn validate(&self) -> Result<(), AppError> {
        let batch_size = self.migration.batch_size;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(AppError::InvalidConfig(format!(
                "migration.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, batch_size
            )));
        }
        if self.firestore.page_size == 0 {
            return Err(AppError::InvalidConfig(
                "firestore.page_size must be positive".to_string(),
            ));
        }
        if self.migration.visits_collection.is_empty() || self.migration.users_collection.is_empty()
        {
            return Err(AppError::InvalidConfig(
                "collection names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// User config path: ~/.config/visit-backfill/config.toml (XDG) or platform config dir.
    fn user_config_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home
                .join(".config")
                .join("visit-backfill")
                .join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("visit-backfill").join("config.toml"))
            .unwrap_or_default()
    }
}
