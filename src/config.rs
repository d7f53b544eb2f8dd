//! Engine configuration.
//!
//! Credentials and tuning load from a TOML file with environment-variable
//! fallback (`RECAST_ENVIRONMENT_ID`, `RECAST_MANAGEMENT_API_KEY`,
//! `RECAST_PREVIEW_API_KEY`), mirroring the priority chain the hosting
//! application uses: explicit parameters first, process environment second.
//! Validation runs before a migration starts; a missing credential is the
//! only failure allowed to abort a whole run.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_ENVIRONMENT_ID: &str = "RECAST_ENVIRONMENT_ID";
pub const ENV_MANAGEMENT_API_KEY: &str = "RECAST_MANAGEMENT_API_KEY";
pub const ENV_PREVIEW_API_KEY: &str = "RECAST_PREVIEW_API_KEY";

fn default_delivery_base() -> String {
    "https://deliver.kontent.ai".to_string()
}

fn default_management_base() -> String {
    "https://manage.kontent.ai".to_string()
}

/// Connection details for the remote content repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub environment_id: String,
    pub management_api_key: String,
    pub preview_api_key: String,
    #[serde(default = "default_delivery_base")]
    pub delivery_base_url: String,
    #[serde(default = "default_management_base")]
    pub management_base_url: String,
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("environment_id", &self.environment_id),
            ("management_api_key", &self.management_api_key),
            ("preview_api_key", &self.preview_api_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingCredential(name.to_string()));
            }
        }
        Ok(())
    }
}

fn default_fallback_languages() -> Vec<String> {
    ["en", "de", "es", "zh"].map(String::from).to_vec()
}

fn default_batch_size() -> usize {
    5
}

fn default_inter_batch_delay_ms() -> u64 {
    2_000
}

/// Publishing is batched so downstream webhook consumers are not flooded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
        }
    }
}

impl PublishConfig {
    /// Caller-chosen batch size, bounded to [1, 50].
    pub fn clamped_batch_size(&self) -> usize {
        self.batch_size.clamp(1, 50)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

/// Run policy: the ordered language-fallback chain and publish tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Ordered languages tried when the source item is absent in the
    /// requested one. The repository default (languageless fetch) is always
    /// tried between the requested language and this list.
    #[serde(default = "default_fallback_languages")]
    pub fallback_languages: Vec<String>,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            fallback_languages: default_fallback_languages(),
            publish: PublishConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecastConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub migration: MigrationSettings,
}

impl RecastConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        config.repository.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    /// Credentials from the process environment, default tuning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::MissingCredential(name.to_string()))
        };
        let config = Self {
            repository: RepositoryConfig {
                environment_id: var(ENV_ENVIRONMENT_ID)?,
                management_api_key: var(ENV_MANAGEMENT_API_KEY)?,
                preview_api_key: var(ENV_PREVIEW_API_KEY)?,
                delivery_base_url: default_delivery_base(),
                management_base_url: default_management_base(),
            },
            migration: MigrationSettings::default(),
        };
        config.repository.validate()?;
        Ok(config)
    }

    /// File first, environment second.
    pub fn load_or_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Self::from_env(),
        }
    }
}
