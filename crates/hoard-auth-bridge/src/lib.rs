//! Session credential handling for Hoard.
//!
//! A [`CredentialAcquirer`] walks an ordered list of [`CredentialSource`]s and
//! returns the first non-empty credential. The standard chain is:
//!
//! 1. [`StoredCredential`]: the single-line token file from a previous run
//! 2. [`ConfiguredCredential`]: a token supplied through configuration
//! 3. [`InteractiveBrowserLogin`]: a real browser login with request
//!    interception, second-factor prompt and manual paste fallback

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod browser;
pub mod chrome;
pub mod prompt;

pub use browser::{BrowserDriver, BrowserLauncher, HeaderLatch, InteractiveBrowserLogin, LoginTimings};
pub use chrome::{ChromeDriver, ChromeLauncher};
pub use prompt::Prompter;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential source produced a usable token")]
    Exhausted,

    #[error("browser automation failed: {0}")]
    Browser(String),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("credential store {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opaque bearer secret presented on every API call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Normalize a raw value. Returns `None` for blanks and the placeholder
    /// strings browsers hand back for unset headers.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let value = raw.as_ref().trim().trim_matches('"').trim();
        if value.is_empty() || value == "undefined" || value == "null" {
            return None;
        }
        Some(Self(value.to_string()))
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} chars>)", self.0.len())
    }
}

/// Plaintext single-line credential file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub const DEFAULT_FILE: &'static str = "discord_token.txt";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential. A missing or unreadable file counts as empty.
    pub fn get(&self) -> Option<Credential> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let line = contents.lines().next().unwrap_or_default();
                let credential = Credential::new(line);
                if credential.is_none() {
                    debug!("credential store {} is empty", self.path.display());
                }
                credential
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read saved token from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Overwrite the store with `credential`.
    pub fn set(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.store_error(source))?;
        }
        std::fs::write(&self.path, credential.secret()).map_err(|source| self.store_error(source))?;
        info!("Token saved to {}", self.path.display());
        Ok(())
    }

    /// Delete the stored credential. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.store_error(source)),
        }
    }

    fn store_error(&self, source: io::Error) -> AuthError {
        AuthError::Store {
            path: self.path.clone(),
            source,
        }
    }
}

/// One step of the acquisition chain.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` hands over to the next source; `Err` aborts the chain.
    async fn obtain(&self) -> Result<Option<Credential>, AuthError>;
}

/// Token persisted by an earlier run.
pub struct StoredCredential {
    store: TokenStore,
}

impl StoredCredential {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialSource for StoredCredential {
    fn name(&self) -> &'static str {
        "stored"
    }

    async fn obtain(&self) -> Result<Option<Credential>, AuthError> {
        let credential = self.store.get();
        if credential.is_some() {
            info!("Found saved token in {}", self.store.path().display());
        }
        Ok(credential)
    }
}

/// Token handed in through configuration.
pub struct ConfiguredCredential {
    value: Option<String>,
}

impl ConfiguredCredential {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl CredentialSource for ConfiguredCredential {
    fn name(&self) -> &'static str {
        "configured"
    }

    async fn obtain(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.value.as_deref().and_then(Credential::new))
    }
}

/// Ordered fallback chain; the first source yielding a credential wins.
pub struct CredentialAcquirer {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialAcquirer {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Names of the configured sources, in the order they are tried.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        for source in &self.sources {
            debug!("Trying credential source: {}", source.name());
            if let Some(credential) = source.obtain().await? {
                info!("Credential acquired from {} source", source.name());
                return Ok(credential);
            }
        }
        Err(AuthError::Exhausted)
    }
}
