//! Interactive browser login.
//!
//! The login flow is written against [`BrowserDriver`] so the ordering of the
//! fallback heuristics can be exercised without a real browser. The
//! production driver lives in [`crate::chrome`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{AuthError, Credential, CredentialSource, Prompter, TokenStore};

pub const DEFAULT_WEB_ORIGIN: &str = "https://discord.com";

const EMAIL_INPUT: &str = "input[name=\"email\"]";
const PASSWORD_INPUT: &str = "input[name=\"password\"]";
const CODE_INPUT: &str = "input[type=\"text\"]";
const SUBMIT_BUTTON: &str = "button[type=\"submit\"]";
const MFA_ROUTE: &str = "auth/mfa";

/// Looks for a token-like entry in local storage, then in cookies.
const STORAGE_PROBE: &str = r#"(() => {
  try {
    const storage = window.localStorage;
    if (storage) {
      for (const key of Object.keys(storage)) {
        if (key.includes('token')) {
          return storage.getItem(key);
        }
      }
    }
    for (const cookie of document.cookie.split(';')) {
      if (cookie.includes('token')) {
        return cookie.split('=')[1] || null;
      }
    }
  } catch (_) {}
  return null;
})()"#;

/// Wraps `window.fetch` and tags the body with the first authorization header
/// it sees.
const FETCH_TAP: &str = r#"(() => {
  const original = window.fetch;
  window.fetch = function (...args) {
    const options = args[1] || {};
    const headers = options.headers || {};
    const value = headers.authorization || headers.Authorization;
    if (value && document.body && !document.body.hasAttribute('data-token')) {
      document.body.setAttribute('data-token', value);
    }
    return original.apply(this, args);
  };
  return null;
})()"#;

const FETCH_TAP_READ: &str = "document.body ? document.body.getAttribute('data-token') : null";

/// Single-assignment slot for the first `authorization` header observed on
/// outgoing browser requests.
#[derive(Debug, Clone, Default)]
pub struct HeaderLatch {
    slot: Arc<OnceLock<Credential>>,
}

impl HeaderLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a raw header value. Returns true if this call filled the slot.
    pub fn offer(&self, value: &str) -> bool {
        match Credential::new(value) {
            Some(credential) => self.slot.set(credential).is_ok(),
            None => false,
        }
    }

    /// Inspect a request's header map (as sent over the devtools protocol).
    pub fn observe_headers(&self, headers: &serde_json::Value) -> bool {
        let Some(map) = headers.as_object() else {
            return false;
        };
        map.iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .filter_map(|(_, value)| value.as_str())
            .any(|value| self.offer(value))
    }

    pub fn get(&self) -> Option<Credential> {
        self.slot.get().cloned()
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Minimal page automation surface used by the login flow.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Navigate and wait for the page to load.
    async fn goto(&mut self, url: &str) -> Result<(), AuthError>;

    async fn current_url(&mut self) -> Result<String, AuthError>;

    async fn type_into(&mut self, selector: &str, text: &str) -> Result<(), AuthError>;

    /// Click `selector` and wait for the resulting navigation. A navigation
    /// that never happens is not an error.
    async fn submit(&mut self, selector: &str) -> Result<(), AuthError>;

    async fn reload(&mut self) -> Result<(), AuthError>;

    /// Evaluate an expression in the page, returning it if it is a string.
    async fn evaluate(&mut self, expression: &str) -> Result<Option<String>, AuthError>;

    async fn click(&mut self, selector: &str) -> Result<(), AuthError>;

    async fn press_key(&mut self, key: &str) -> Result<(), AuthError>;

    /// Tear the browser down. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<(), AuthError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Driver: BrowserDriver;

    /// Start a browser whose request observer feeds `latch`.
    async fn launch(&self, latch: HeaderLatch) -> Result<Self::Driver, AuthError>;
}

/// Fixed waits that give the web app time to fire authenticated requests.
#[derive(Debug, Clone, Copy)]
pub struct LoginTimings {
    pub settle: Duration,
    pub reload_settle: Duration,
    pub probe_settle: Duration,
}

impl Default for LoginTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            reload_settle: Duration::from_secs(5),
            probe_settle: Duration::from_secs(3),
        }
    }
}

/// Drives a visible browser through the platform login and recovers the
/// session token from its traffic.
pub struct InteractiveBrowserLogin<L> {
    launcher: L,
    email: String,
    password: String,
    prompter: Arc<dyn Prompter>,
    store: Option<TokenStore>,
    origin: String,
    timings: LoginTimings,
}

impl<L: BrowserLauncher> InteractiveBrowserLogin<L> {
    pub fn new(
        launcher: L,
        email: impl Into<String>,
        password: impl Into<String>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            launcher,
            email: email.into(),
            password: password.into(),
            prompter,
            store: None,
            origin: DEFAULT_WEB_ORIGIN.to_string(),
            timings: LoginTimings::default(),
        }
    }

    /// Persist whatever credential the flow obtains.
    pub fn with_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timings(mut self, timings: LoginTimings) -> Self {
        self.timings = timings;
        self
    }

    async fn drive(
        &self,
        driver: &mut L::Driver,
        latch: &HeaderLatch,
    ) -> Result<Option<Credential>, AuthError> {
        driver.goto(&format!("{}/login", self.origin)).await?;
        info!("Login page loaded");

        driver.type_into(EMAIL_INPUT, &self.email).await?;
        driver.type_into(PASSWORD_INPUT, &self.password).await?;
        driver.submit(SUBMIT_BUTTON).await?;
        info!("Login submitted");

        let url = driver.current_url().await?;
        if url.contains(MFA_ROUTE) {
            info!("Second-factor challenge required");
            let code = self.prompter.one_time_code().await?;
            driver.type_into(CODE_INPUT, code.trim()).await?;
            driver.submit(SUBMIT_BUTTON).await?;
            info!("Second-factor code submitted");
        }

        driver.goto(&format!("{}/channels/@me", self.origin)).await?;
        info!("Waiting for authenticated requests...");
        tokio::time::sleep(self.timings.settle).await;
        if let Some(credential) = latch.get() {
            return Ok(Some(credential));
        }

        info!("No token observed yet, reloading page");
        driver.reload().await?;
        tokio::time::sleep(self.timings.reload_settle).await;
        if let Some(credential) = latch.get() {
            return Ok(Some(credential));
        }

        info!("No token in network traffic, probing page state");
        if let Some(credential) = driver.evaluate(STORAGE_PROBE).await?.and_then(Credential::new) {
            return Ok(Some(credential));
        }

        driver.evaluate(FETCH_TAP).await?;
        driver.click("body").await?;
        driver.press_key("Escape").await?;
        tokio::time::sleep(self.timings.probe_settle).await;
        if let Some(credential) = driver.evaluate(FETCH_TAP_READ).await?.and_then(Credential::new) {
            return Ok(Some(credential));
        }
        if let Some(credential) = latch.get() {
            return Ok(Some(credential));
        }

        warn!("Could not extract the token automatically");
        let pasted = self.prompter.manual_credential().await?;
        Ok(Credential::new(pasted))
    }
}

#[async_trait]
impl<L> CredentialSource for InteractiveBrowserLogin<L>
where
    L: BrowserLauncher,
{
    fn name(&self) -> &'static str {
        "interactive"
    }

    async fn obtain(&self) -> Result<Option<Credential>, AuthError> {
        info!("Starting browser login for {}", self.email);
        let latch = HeaderLatch::new();
        let mut driver = self.launcher.launch(latch.clone()).await?;

        let outcome = self.drive(&mut driver, &latch).await;
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser: {}", e);
        }

        let credential = outcome?;
        if let (Some(credential), Some(store)) = (credential.as_ref(), self.store.as_ref()) {
            if let Err(e) = store.set(credential) {
                warn!("Failed to save token: {}", e);
            }
        }
        Ok(credential)
    }
}
