//! Runtime configuration.
//!
//! Resolved once at process startup and passed by reference into the
//! services that need it. Nothing below the host process reads the
//! environment directly.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const ENV_OUTPUT_DIR: &str = "MEDFLOW_OUTPUT_DIR";
pub const ENV_DB_PATH: &str = "MEDFLOW_DB_PATH";
pub const ENV_PROVIDER_NAME: &str = "MEDFLOW_PROVIDER_NAME";
pub const ENV_OLLAMA_URL: &str = "MEDFLOW_OLLAMA_URL";
pub const ENV_MODEL: &str = "MEDFLOW_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "MEDFLOW_TIMEOUT_SECS";
pub const ENV_MAX_NEW_TOKENS: &str = "MEDFLOW_MAX_NEW_TOKENS";

pub const DEFAULT_OUTPUT_DIR: &str = "pdfs";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "medgemma";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 800;

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_new_tokens: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MedflowConfig {
    output_dir: PathBuf,
    database_path: Option<PathBuf>,
    provider_name: Option<String>,
    generator: GeneratorSettings,
}

impl Default for MedflowConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            database_path: None,
            provider_name: None,
            generator: GeneratorSettings::default(),
        }
    }
}

impl MedflowConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let generator = GeneratorSettings {
            base_url: get(ENV_OLLAMA_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: get(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: parse_positive(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS))?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            max_new_tokens: parse_positive(ENV_MAX_NEW_TOKENS, get(ENV_MAX_NEW_TOKENS))?
                .unwrap_or(DEFAULT_MAX_NEW_TOKENS),
        };

        Ok(Self {
            output_dir: get(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            database_path: get(ENV_DB_PATH).map(PathBuf::from),
            provider_name: get(ENV_PROVIDER_NAME),
            generator,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider_name.as_deref()
    }

    pub fn generator(&self) -> &GeneratorSettings {
        &self.generator
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(path);
        self
    }
}

fn parse_positive<T>(key: &str, value: Option<String>) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = value.parse::<T>().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("'{}' is not a number", value),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Some(parsed))
}
