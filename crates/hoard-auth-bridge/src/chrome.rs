//! Chrome-backed [`BrowserDriver`] using chromiumoxide.

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser::{BrowserDriver, BrowserLauncher, HeaderLatch};
use crate::AuthError;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

fn browser_error(e: impl Display) -> AuthError {
    AuthError::Browser(e.to_string())
}

/// Launches a visible Chrome window for the login flow.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    user_agent: String,
    window: (u32, u32),
    navigation_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            window: (1280, 800),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chrome/Chromium binary instead of auto-detection.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn config(&self) -> Result<BrowserConfig, AuthError> {
        let (width, height) = self.window;
        let mut builder = BrowserConfig::builder()
            .with_head()
            .window_size(width, height)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg(format!("--window-size={},{}", width, height));
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(AuthError::Browser)
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Driver = ChromeDriver;

    async fn launch(&self, latch: HeaderLatch) -> Result<ChromeDriver, AuthError> {
        let (browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(browser_error)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut driver = ChromeDriver {
            browser,
            page: None,
            tasks: vec![handler_task],
            navigation_timeout: self.navigation_timeout,
        };

        // The browser is already running; tear it down if page setup fails.
        if let Err(e) = driver.open_page(&self.user_agent, latch).await {
            let _ = driver.close().await;
            return Err(e);
        }
        Ok(driver)
    }
}

pub struct ChromeDriver {
    browser: Browser,
    page: Option<Page>,
    tasks: Vec<JoinHandle<()>>,
    navigation_timeout: Duration,
}

impl ChromeDriver {
    async fn open_page(&mut self, user_agent: &str, latch: HeaderLatch) -> Result<(), AuthError> {
        let page = self.browser.new_page("about:blank").await.map_err(browser_error)?;
        page.set_user_agent(user_agent).await.map_err(browser_error)?;
        page.execute(EnableParams::default()).await.map_err(browser_error)?;

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(browser_error)?;
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                if latch.observe_headers(event.request.headers.inner()) {
                    debug!("authorization header captured from {}", event.request.url);
                }
            }
        }));

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, AuthError> {
        self.page
            .as_ref()
            .ok_or_else(|| AuthError::Browser("no page open".to_string()))
    }

    async fn wait_for_navigation(&self) {
        let Ok(page) = self.page() else {
            return;
        };
        match tokio::time::timeout(self.navigation_timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("navigation wait failed: {}", e),
            Err(_) => debug!("navigation wait timed out"),
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn goto(&mut self, url: &str) -> Result<(), AuthError> {
        self.page()?.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, AuthError> {
        let url = self.page()?.url().await.map_err(browser_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn type_into(&mut self, selector: &str, text: &str) -> Result<(), AuthError> {
        let element = self.page()?.find_element(selector).await.map_err(browser_error)?;
        element.click().await.map_err(browser_error)?;
        element.type_str(text).await.map_err(browser_error)?;
        Ok(())
    }

    async fn submit(&mut self, selector: &str) -> Result<(), AuthError> {
        let element = self.page()?.find_element(selector).await.map_err(browser_error)?;
        element.click().await.map_err(browser_error)?;
        self.wait_for_navigation().await;
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), AuthError> {
        self.page()?.reload().await.map_err(browser_error)?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Option<String>, AuthError> {
        let result = self.page()?.evaluate(expression).await.map_err(browser_error)?;
        Ok(result
            .value()
            .and_then(|value| value.as_str())
            .map(str::to_string))
    }

    async fn click(&mut self, selector: &str) -> Result<(), AuthError> {
        let element = self.page()?.find_element(selector).await.map_err(browser_error)?;
        element.click().await.map_err(browser_error)?;
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> Result<(), AuthError> {
        let element = self.page()?.find_element("body").await.map_err(browser_error)?;
        element.press_key(key).await.map_err(browser_error)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AuthError> {
        let closed = self.browser.close().await.map(|_| ()).map_err(browser_error);
        if let Err(e) = self.browser.wait().await {
            warn!("browser process did not exit cleanly: {}", e);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.page = None;
        closed
    }
}
