use std::time::Duration;

use async_trait::async_trait;
use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use hoard_auth_bridge::{AuthError, Prompter};

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", style("✔").green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✖").red(), msg);
}

/// Print info message (indented)
pub fn info(msg: &str) {
    println!("  {}", msg);
}

/// Print a header/title
pub fn header(msg: &str) {
    println!();
    println!("  {}", style(msg).bold());
    println!();
}

/// Prompt for a password/token (masked input)
pub fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    let value = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;
    Ok(value)
}

/// Prompt for regular text input
pub fn prompt_input(prompt: &str) -> anyhow::Result<String> {
    let value = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?;
    Ok(value)
}

/// Create a spinner for indeterminate progress
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Terminal prompts for the browser login.
///
/// dialoguer blocks, so each prompt runs on the blocking pool and the
/// browser's event handler keeps running meanwhile.
pub struct DialoguerPrompter;

async fn blocking_prompt<F>(ask: F) -> Result<String, AuthError>
where
    F: FnOnce() -> anyhow::Result<String> + Send + 'static,
{
    match tokio::task::spawn_blocking(ask).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AuthError::Prompt(e.to_string())),
        Err(e) => Err(AuthError::Prompt(e.to_string())),
    }
}

#[async_trait]
impl Prompter for DialoguerPrompter {
    async fn one_time_code(&self) -> Result<String, AuthError> {
        blocking_prompt(|| {
            println!();
            info("Two-factor authentication is enabled on this account.");
            prompt_input("Enter your 2FA code")
        })
        .await
    }

    async fn manual_credential(&self) -> Result<String, AuthError> {
        blocking_prompt(|| {
            println!();
            info("The token could not be captured automatically. To copy it by hand:");
            info("1. Open developer tools in the browser window (F12)");
            info("2. Go to the Network tab and reload the page");
            info("3. Pick any request to /api/ and copy its Authorization header");
            println!();
            prompt_password("Paste the token (leave empty to give up)")
        })
        .await
    }
}
