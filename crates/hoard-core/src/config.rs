//! Harvest configuration.
//!
//! Loaded from an optional TOML file (`hoard.toml` by default), then
//! overridden by environment variables. A `.env` file in the working
//! directory is read first so its values count as environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use hoard_auth_bridge::TokenStore;

use crate::discord::DEFAULT_API_BASE;
use crate::error::{HarvestError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "hoard.toml";

pub const ENV_EMAIL: &str = "DISCORD_EMAIL";
pub const ENV_PASSWORD: &str = "DISCORD_PASSWORD";
pub const ENV_TOKEN: &str = "USER_TOKEN";
pub const ENV_SERVER_ID: &str = "SERVER_ID";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const ENV_TOKEN_PATH: &str = "HOARD_TOKEN_PATH";
pub const ENV_API_BASE: &str = "HOARD_API_BASE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub account_email: Option<String>,
    pub account_password: Option<String>,
    /// Pre-supplied session credential.
    pub direct_credential: Option<String>,
    pub server_id: Option<String>,
    pub output_directory: PathBuf,
    pub token_path: PathBuf,
    pub api_base: String,
    /// Chrome binary for the interactive login; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            account_email: None,
            account_password: None,
            direct_credential: None,
            server_id: None,
            output_directory: PathBuf::from("."),
            token_path: PathBuf::from(TokenStore::DEFAULT_FILE),
            api_base: DEFAULT_API_BASE.to_string(),
            chrome_executable: None,
        }
    }
}

impl HarvestConfig {
    /// Load `.env`, the config file and the process environment.
    ///
    /// A missing file is only an error when its path was given explicitly.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(HarvestError::Configuration(format!(".env: {}", e))),
        }

        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Configuration(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            HarvestError::Configuration(msg) => {
                HarvestError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| HarvestError::Configuration(e.to_string()))
    }

    /// Override fields with non-blank values from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_EMAIL) {
            self.account_email = Some(v);
        }
        if let Some(v) = get(ENV_PASSWORD) {
            self.account_password = Some(v);
        }
        if let Some(v) = get(ENV_TOKEN) {
            self.direct_credential = Some(v);
        }
        if let Some(v) = get(ENV_SERVER_ID) {
            self.server_id = Some(v);
        }
        if let Some(v) = get(ENV_OUTPUT_DIR) {
            self.output_directory = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_TOKEN_PATH) {
            self.token_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_API_BASE) {
            self.api_base = v;
        }
    }

    /// Checks that must pass before any network activity.
    pub fn validate(&self) -> Result<()> {
        self.require_server_id()?;
        if self.api_base.trim().is_empty() {
            return Err(HarvestError::Configuration("api base must not be empty".into()));
        }
        if self.account_email.is_some() != self.account_password.is_some() {
            return Err(HarvestError::Configuration(format!(
                "{} and {} must be set together",
                ENV_EMAIL, ENV_PASSWORD
            )));
        }
        Ok(())
    }

    pub fn require_server_id(&self) -> Result<&str> {
        self.server_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                HarvestError::Configuration(format!("{} is required", ENV_SERVER_ID))
            })
    }

    /// Email and password, when both are configured.
    pub fn login_account(&self) -> Option<(&str, &str)> {
        match (self.account_email.as_deref(), self.account_password.as_deref()) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }

    pub fn token_store(&self) -> TokenStore {
        TokenStore::new(self.token_path.clone())
    }
}
