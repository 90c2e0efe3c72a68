//! Hoard core: harvests messages, media and links from a chat server into
//! a local directory tree.
//!
//! [`run_harvest`] is the whole run: validate configuration, acquire a
//! credential, log in, run the [`Pipeline`], and close the session.

pub mod config;
pub mod discord;
pub mod error;
pub mod export;
pub mod harvester;
pub mod links;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod session;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hoard_auth_bridge::{
    ChromeLauncher, ConfiguredCredential, Credential, CredentialAcquirer, CredentialSource,
    InteractiveBrowserLogin, Prompter, StoredCredential,
};

pub use config::HarvestConfig;
pub use discord::DiscordSession;
pub use error::{HarvestError, Result};
pub use models::{Channel, ChannelKind, ChannelType, Message, ServerInfo};
pub use pipeline::{HarvestMode, Pipeline, RunSummary, DEFAULT_MESSAGE_LIMIT};
pub use session::{SessionClient, SessionError};

/// Stored, then configured, then browser login when an account is set.
pub fn credential_chain(config: &HarvestConfig, prompter: Arc<dyn Prompter>) -> CredentialAcquirer {
    let mut sources: Vec<Box<dyn CredentialSource>> = vec![
        Box::new(StoredCredential::new(config.token_store())),
        Box::new(ConfiguredCredential::new(config.direct_credential.clone())),
    ];

    if let Some((email, password)) = config.login_account() {
        let mut launcher = ChromeLauncher::new();
        if let Some(path) = &config.chrome_executable {
            launcher = launcher.with_executable(path);
        }
        sources.push(Box::new(
            InteractiveBrowserLogin::new(launcher, email, password, prompter)
                .with_store(config.token_store()),
        ));
    }

    CredentialAcquirer::new(sources)
}

/// Acquire a credential and log a fresh REST session in with it.
pub async fn connect(
    config: &HarvestConfig,
    prompter: Arc<dyn Prompter>,
) -> Result<(DiscordSession, Credential)> {
    config.validate()?;
    let stored = config.token_store().get().is_some();
    let configured = config
        .direct_credential
        .as_deref()
        .is_some_and(|v| !v.trim().is_empty());
    if !stored && !configured && config.login_account().is_none() {
        return Err(HarvestError::Configuration(format!(
            "no credential configured: set {} or {} and {}",
            config::ENV_TOKEN,
            config::ENV_EMAIL,
            config::ENV_PASSWORD
        )));
    }
    let acquirer = credential_chain(config, prompter);
    info!("Credential sources: {}", acquirer.source_names().join(" -> "));
    let credential = acquirer.acquire().await?;
    let session = DiscordSession::new(config.api_base.clone())?;
    Ok((session, credential))
}

pub async fn run_harvest(
    config: &HarvestConfig,
    mode: HarvestMode,
    limit: usize,
    prompter: Arc<dyn Prompter>,
) -> Result<RunSummary> {
    mode.validate()?;
    let (session, credential) = connect(config, prompter).await?;
    run_with_session(&session, &credential, config, &mode, limit).await
}

/// Log in, run the pipeline, and close the session whatever the outcome.
pub async fn run_with_session(
    session: &dyn SessionClient,
    credential: &Credential,
    config: &HarvestConfig,
    mode: &HarvestMode,
    limit: usize,
) -> Result<RunSummary> {
    let outcome = login_and_run(session, credential, config, mode, limit).await;
    session.close().await;
    outcome
}

async fn login_and_run(
    session: &dyn SessionClient,
    credential: &Credential,
    config: &HarvestConfig,
    mode: &HarvestMode,
    limit: usize,
) -> Result<RunSummary> {
    session.login(credential).await?;
    let pipeline = Pipeline::new(
        session,
        config.require_server_id()?,
        config.output_directory.clone(),
        download_client()?,
    );
    pipeline.run(mode, limit).await
}

/// Every channel of the server, parent category names resolved.
pub async fn list_channels(
    session: &dyn SessionClient,
    credential: &Credential,
    guild_id: &str,
) -> Result<Vec<Channel>> {
    let outcome = login_and_list(session, credential, guild_id).await;
    session.close().await;
    outcome
}

async fn login_and_list(
    session: &dyn SessionClient,
    credential: &Credential,
    guild_id: &str,
) -> Result<Vec<Channel>> {
    session.login(credential).await?;
    Ok(session.fetch_channels(guild_id).await?)
}

fn download_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| HarvestError::Session(SessionError::Http(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{channel, history, FakeSession};
    use chrono::Utc;

    struct NoPrompts;

    #[async_trait::async_trait]
    impl Prompter for NoPrompts {
        async fn one_time_code(&self) -> std::result::Result<String, hoard_auth_bridge::AuthError> {
            panic!("unexpected one-time code prompt");
        }

        async fn manual_credential(&self) -> std::result::Result<String, hoard_auth_bridge::AuthError> {
            panic!("unexpected manual prompt");
        }
    }

    fn config(dir: &std::path::Path) -> HarvestConfig {
        HarvestConfig {
            server_id: Some("g1".into()),
            output_directory: dir.to_path_buf(),
            token_path: dir.join("token.txt"),
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn test_chain_without_account_has_no_browser() {
        let dir = tempfile::tempdir().unwrap();
        let chain = credential_chain(&config(dir.path()), Arc::new(NoPrompts));
        assert_eq!(chain.source_names(), vec!["stored", "configured"]);

        let cfg = HarvestConfig {
            account_email: Some("a@b.c".into()),
            account_password: Some("pw".into()),
            ..config(dir.path())
        };
        let chain = credential_chain(&cfg, Arc::new(NoPrompts));
        assert_eq!(chain.source_names(), vec!["stored", "configured", "interactive"]);
    }

    #[tokio::test]
    async fn test_stored_credential_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HarvestConfig {
            direct_credential: Some("configured".into()),
            account_email: Some("a@b.c".into()),
            account_password: Some("pw".into()),
            ..config(dir.path())
        };
        cfg.token_store().set(&Credential::new("stored").unwrap()).unwrap();

        let credential = credential_chain(&cfg, Arc::new(NoPrompts)).acquire().await.unwrap();
        assert_eq!(credential.secret(), "stored");
    }

    #[tokio::test]
    async fn test_session_closed_after_rejected_login() {
        let dir = tempfile::tempdir().unwrap();
        let session = FakeSession {
            reject_login: true,
            ..FakeSession::default()
        };
        let err = run_with_session(
            &session,
            &Credential::new("tok").unwrap(),
            &config(dir.path()),
            &HarvestMode::AllChannels,
            10,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Session(SessionError::Unauthorized)));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_session_closed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = FakeSession {
            guild: Some(ServerInfo {
                id: "g1".into(),
                name: "Guild".into(),
                icon: None,
                member_count: None,
                created_at: Utc::now(),
            }),
            channels: vec![channel("a", "alpha", ChannelType::Text)],
            ..FakeSession::default()
        };
        session.history.insert("a".into(), history(3));

        let summary = run_with_session(
            &session,
            &Credential::new("tok").unwrap(),
            &config(dir.path()),
            &HarvestMode::AllChannels,
            10,
        )
        .await
        .unwrap();
        assert_eq!(summary.messages, 3);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_empty_explicit_mode_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_harvest(
            &config(dir.path()),
            HarvestMode::Explicit(Vec::new()),
            10,
            Arc::new(NoPrompts),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_no_credential_source_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_harvest(
            &config(dir.path()),
            HarvestMode::AllChannels,
            10,
            Arc::new(NoPrompts),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Configuration(_)));
        assert!(err.to_string().contains("USER_TOKEN"));
    }

    #[tokio::test]
    async fn test_list_channels_closes_session() {
        let session = FakeSession {
            channels: vec![
                channel("a", "alpha", ChannelType::Text),
                channel("v", "voice", ChannelType::Voice),
            ],
            ..FakeSession::default()
        };
        let channels = list_channels(&session, &Credential::new("tok").unwrap(), "g1")
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert!(session.is_closed());
    }
}
