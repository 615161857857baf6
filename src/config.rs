//! Profile configuration files.
//!
//! A TOML file lists notch profiles (one `[[profiles]]` table per strategy
//! family) and optionally the daily loss guardrail. Built-in profiles are
//! used when a name is not found in the file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notch::{NotchScale, ScaleError};
use crate::risk::{GuardrailConfig, GuardrailError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid profile '{name}': {source}")]
    InvalidProfile {
        name: String,
        #[source]
        source: ScaleError,
    },

    #[error("Duplicate profile '{0}'")]
    DuplicateProfile(String),

    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("Invalid guardrail: {0}")]
    Guardrail(#[from] GuardrailError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub profiles: Vec<NotchScale>,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
}

impl ProfileConfig {
    /// Parse and validate every profile.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, profile) in self.profiles.iter().enumerate() {
            profile
                .validate()
                .map_err(|source| ConfigError::InvalidProfile {
                    name: profile.name.clone(),
                    source,
                })?;
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::DuplicateProfile(profile.name.clone()));
            }
        }
        self.guardrail.validate()?;
        Ok(())
    }

    /// Profile by name, falling back to the built-in profiles.
    pub fn profile(&self, name: &str) -> Result<NotchScale, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| NotchScale::builtin(name))
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }
}
