use anyhow::{Context, anyhow};
use estate_auth::ClientConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "estate";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";

/// On-disk CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ClientConfig,
}

/// Flag values that take precedence over the file and the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub credentials_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load the config file (if any), then apply environment variables
    /// (including a `.env` file) and finally the command-line overrides.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;

        dotenvy::dotenv().ok();
        config.api = config.api.with_env();
        config.apply(overrides);

        if config.api.credentials_file.is_none() {
            config.api.credentials_file = default_dir().map(|dir| dir.join(CREDENTIALS_FILE));
        }

        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.api_url {
            self.api.base_url = url;
        }
        if let Some(secs) = overrides.timeout_secs.filter(|secs| *secs > 0) {
            self.api.timeout_secs = secs;
        }
        if let Some(path) = overrides.credentials_file {
            self.api.credentials_file = Some(path);
        }
    }

    /// Write the default configuration, replacing any existing file.
    pub fn reset(path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_path().ok_or_else(|| anyhow!("no configuration directory available"))?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, Self::default().show()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn show(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

fn default_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn default_path() -> Option<PathBuf> {
    default_dir().map(|dir| dir.join(CONFIG_FILE))
}
