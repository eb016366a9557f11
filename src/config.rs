use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::organizer::DEFAULT_DOCUMENT_EXTENSION;

pub const CONFIG_ENV_VAR: &str = "BILL_ORGANIZER_CONFIG";
const APP_DIR_NAME: &str = "bill-organizer";
const CONFIG_FILE_NAME: &str = "config.toml";
const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Settings read from `config.toml`. Command-line arguments take precedence
/// over every field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    pub document_extension: String,
    pub mapping_path: Option<PathBuf>,
    pub destination_root: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
            mapping_path: None,
            destination_root: None,
            history_path: None,
        }
    }
}

fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

impl OrganizerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Explicit path first, then `$BILL_ORGANIZER_CONFIG`, then the per-user
    /// config file if it exists, otherwise defaults. Only an explicitly named
    /// file is required to exist.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            if !env_path.trim().is_empty() {
                return Self::from_path(Path::new(env_path.trim()));
            }
        }
        if let Some(path) = app_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) {
            if path.is_file() {
                debug!(path = %path.display(), "using user config");
                return Self::from_path(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        self.history_path.clone().unwrap_or_else(|| {
            app_config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(HISTORY_FILE_NAME)
        })
    }
}
