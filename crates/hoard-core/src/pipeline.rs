//! Server-level orchestration: server metadata, channel resolution, then
//! harvest, export, media and link processing for each channel in turn.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{HarvestError, Result};
use crate::export::{sanitize_filename, write_channel_exports, write_json};
use crate::harvester::ChannelHarvester;
use crate::links::{LinkCatalog, UrlProcessor, UrlStats};
use crate::media::{download_file, MediaCollector};
use crate::models::Channel;
use crate::session::SessionClient;

pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestMode {
    /// Every text, forum and media channel of the server.
    AllChannels,
    /// Only these channel ids, in order.
    Explicit(Vec<String>),
}

impl HarvestMode {
    /// An explicit list must name at least one channel.
    pub fn validate(&self) -> Result<()> {
        match self {
            HarvestMode::Explicit(ids) if ids.is_empty() => Err(HarvestError::Configuration(
                "channel id list is empty; pass at least one channel id".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub channels_processed: usize,
    pub channels_skipped: usize,
    pub messages: usize,
    pub media_saved: usize,
    pub media_failed: usize,
    pub urls: UrlStats,
}

pub struct Pipeline<'a> {
    session: &'a dyn SessionClient,
    guild_id: String,
    output_dir: PathBuf,
    http: reqwest::Client,
    media: MediaCollector,
    urls: Box<dyn UrlProcessor>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        session: &'a dyn SessionClient,
        guild_id: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        http: reqwest::Client,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            session,
            guild_id: guild_id.into(),
            media: MediaCollector::new(http.clone(), output_dir.join("media")),
            output_dir,
            http,
            urls: Box::new(LinkCatalog),
        }
    }

    pub fn with_url_processor(mut self, urls: Box<dyn UrlProcessor>) -> Self {
        self.urls = urls;
        self
    }

    pub async fn run(&self, mode: &HarvestMode, limit: usize) -> Result<RunSummary> {
        mode.validate()?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        self.save_server_info().await?;

        let mut summary = RunSummary::default();
        let channels = match mode {
            HarvestMode::AllChannels => {
                let channels = self.harvestable_channels().await?;
                info!("Found {} text/forum/media channels", channels.len());
                write_json(&channels, &self.output_dir.join("channels.json")).await?;
                channels
            }
            HarvestMode::Explicit(ids) => {
                info!("Harvesting {} selected channels", ids.len());
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.session.fetch_channel(id).await {
                        Ok(channel) => resolved.push(channel),
                        Err(e) => {
                            warn!("Skipping channel: {}", HarvestError::channel(id, e));
                            summary.channels_skipped += 1;
                        }
                    }
                }
                resolved
            }
        };

        for channel in &channels {
            match self.process_channel(channel, limit, &mut summary).await {
                Ok(()) => summary.channels_processed += 1,
                Err(e) => {
                    warn!("Channel {} ({}) failed: {}", channel.name, channel.id, e);
                    summary.channels_skipped += 1;
                }
            }
        }

        info!(
            "Harvest complete: {} channels, {} messages, {} media files. Output in {}",
            summary.channels_processed,
            summary.messages,
            summary.media_saved,
            self.output_dir.display()
        );
        Ok(summary)
    }

    async fn save_server_info(&self) -> Result<()> {
        let server = self.session.fetch_guild(&self.guild_id).await?;
        info!("Server: {} ({})", server.name, server.id);
        write_json(&server, &self.output_dir.join("server_info.json")).await?;

        if let Some(icon) = &server.icon {
            let target = self.output_dir.join("server_icon.png");
            if let Err(e) = download_file(&self.http, icon, &target).await {
                warn!("Server icon not saved: {}", e);
            }
        }
        Ok(())
    }

    async fn harvestable_channels(&self) -> Result<Vec<Channel>> {
        let channels = self.session.fetch_channels(&self.guild_id).await?;
        Ok(channels.into_iter().filter(Channel::is_harvestable).collect())
    }

    async fn process_channel(
        &self,
        channel: &Channel,
        limit: usize,
        summary: &mut RunSummary,
    ) -> Result<()> {
        info!("Processing channel: {} ({})", channel.name, channel.id);
        let dir = self.channel_dir(channel);

        let messages = ChannelHarvester::new(self.session).collect(channel, limit).await;
        info!("  {} messages collected", messages.len());
        write_channel_exports(&messages, &dir).await?;
        summary.messages += messages.len();

        let media = self.media.harvest(&messages, &channel.name).await;
        summary.media_saved += media.saved;
        summary.media_failed += media.failed;

        let urls = self.urls.process(&messages, &dir).await;
        info!(
            "  URLs: {} total (mega: {}, other: {})",
            urls.total, urls.mega, urls.other
        );
        summary.urls.add(urls);
        Ok(())
    }

    fn channel_dir(&self, channel: &Channel) -> PathBuf {
        self.output_dir.join(sanitize_filename(&channel.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelType, ServerInfo};
    use crate::testing::{channel, history, FakeSession};
    use chrono::Utc;

    fn server() -> ServerInfo {
        ServerInfo {
            id: "g1".into(),
            name: "Guild".into(),
            icon: None,
            member_count: Some(3),
            created_at: Utc::now(),
        }
    }

    fn session() -> FakeSession {
        let mut session = FakeSession {
            guild: Some(server()),
            channels: vec![
                channel("a", "alpha", ChannelType::Text),
                channel("v", "voice", ChannelType::Voice),
                channel("c", "category", ChannelType::Category),
                channel("f", "forum", ChannelType::Forum),
            ],
            ..FakeSession::default()
        };
        session.history.insert("a".into(), history(5));
        session.threads.insert("f".into(), Default::default());
        session
    }

    #[tokio::test]
    async fn test_explicit_skips_unresolvable() {
        let session = session();
        let out = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&session, "g1", out.path(), reqwest::Client::new());

        let summary = pipeline
            .run(&HarvestMode::Explicit(vec!["a".into(), "missing".into()]), 100)
            .await
            .unwrap();

        assert_eq!(summary.channels_processed, 1);
        assert_eq!(summary.channels_skipped, 1);
        assert_eq!(summary.messages, 5);
        assert!(out.path().join("server_info.json").exists());
        assert!(out.path().join("alpha").join("messages.json").exists());
        assert!(out.path().join("alpha").join("messages.txt").exists());
        assert!(out.path().join("alpha").join("links.json").exists());
        assert!(!out.path().join("channels.json").exists());
    }

    #[tokio::test]
    async fn test_all_channels_only_harvestable() {
        let session = session();
        let out = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&session, "g1", out.path(), reqwest::Client::new());

        let summary = pipeline.run(&HarvestMode::AllChannels, 100).await.unwrap();
        assert_eq!(summary.channels_processed, 2);

        let listed: Vec<serde_json::Value> =
            serde_json::from_slice(&std::fs::read(out.path().join("channels.json")).unwrap())
                .unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "f"]);
        assert!(!out.path().join("voice").exists());
    }

    struct CountingUrls(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait::async_trait]
    impl UrlProcessor for CountingUrls {
        async fn process(&self, messages: &[crate::models::Message], _dir: &std::path::Path) -> UrlStats {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            UrlStats {
                total: messages.len(),
                mega: 0,
                other: messages.len(),
            }
        }
    }

    #[tokio::test]
    async fn test_url_processor_runs_per_channel() {
        let session = session();
        let out = tempfile::tempdir().unwrap();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let pipeline = Pipeline::new(&session, "g1", out.path(), reqwest::Client::new())
            .with_url_processor(Box::new(CountingUrls(calls.clone())));

        let summary = pipeline.run(&HarvestMode::AllChannels, 100).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(summary.urls.total, 5);
        assert!(!out.path().join("alpha").join("links.json").exists());
    }

    #[tokio::test]
    async fn test_empty_explicit_list_rejected() {
        let session = session();
        let out = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&session, "g1", out.path(), reqwest::Client::new());
        let err = pipeline
            .run(&HarvestMode::Explicit(Vec::new()), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Configuration(_)));
        assert!(!out.path().join("server_info.json").exists());
    }

    #[test]
    fn test_mode_validation() {
        assert!(HarvestMode::AllChannels.validate().is_ok());
        assert!(HarvestMode::Explicit(vec!["a".into()]).validate().is_ok());
        assert!(matches!(
            HarvestMode::Explicit(Vec::new()).validate(),
            Err(HarvestError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_server_aborts() {
        let session = FakeSession::default();
        let out = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&session, "g1", out.path(), reqwest::Client::new());
        let err = pipeline.run(&HarvestMode::AllChannels, 10).await.unwrap_err();
        assert!(matches!(err, HarvestError::Session(_)));
    }
}
