//! Media discovery and concurrent download.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::export::{ensure_dir, filename_from_url, sanitize_filename};
use crate::models::{AssetKind, AssetOutcome, MediaAsset, Message};

/// Counts for one channel's media batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaReport {
    pub discovered: usize,
    pub saved: usize,
    pub failed: usize,
}

pub struct MediaCollector {
    client: reqwest::Client,
    media_root: PathBuf,
}

impl MediaCollector {
    pub fn new(client: reqwest::Client, media_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            media_root: media_root.into(),
        }
    }

    pub fn channel_dir(&self, channel_name: &str) -> PathBuf {
        self.media_root.join(sanitize_filename(channel_name))
    }

    /// Every attachment, embed image and embed thumbnail, in message order.
    pub fn discover(messages: &[Message], dir: &Path) -> Vec<MediaAsset> {
        let mut assets = Vec::new();
        for message in messages {
            let mut push = |url: &str, prefix: &str, kind: AssetKind| {
                let name = format!("{}_{}{}", message.id, prefix, filename_from_url(url));
                assets.push(MediaAsset {
                    source_message_id: message.id.clone(),
                    url: url.to_string(),
                    destination: dir.join(name),
                    kind,
                    outcome: AssetOutcome::Pending,
                });
            };

            for attachment in &message.attachments {
                push(&attachment.url, "", AssetKind::Attachment);
            }
            for embed in &message.embeds {
                if let Some(image) = &embed.image {
                    push(image, "embed_", AssetKind::EmbedImage);
                }
                if let Some(thumbnail) = &embed.thumbnail {
                    push(thumbnail, "thumbnail_", AssetKind::EmbedThumbnail);
                }
            }
        }
        assets
    }

    /// Download every asset of `messages` concurrently. Failures are logged
    /// per asset and counted, never returned.
    pub async fn harvest(&self, messages: &[Message], channel_name: &str) -> MediaReport {
        let dir = self.channel_dir(channel_name);
        let assets = Self::discover(messages, &dir);
        let mut report = MediaReport {
            discovered: assets.len(),
            ..MediaReport::default()
        };
        if assets.is_empty() {
            return report;
        }

        if let Err(e) = ensure_dir(&dir).await {
            warn!("cannot create media directory {}: {}", dir.display(), e);
            report.failed = assets.len();
            return report;
        }

        let downloads = assets.iter().map(|asset| self.fetch(asset));
        let finished = join_all(downloads).await;

        for asset in &finished {
            match &asset.outcome {
                AssetOutcome::Saved { .. } => report.saved += 1,
                AssetOutcome::Failed { .. } => report.failed += 1,
                AssetOutcome::Pending => {}
            }
        }
        info!(
            "  Media for {}: {} saved, {} failed",
            channel_name, report.saved, report.failed
        );
        report
    }

    async fn fetch(&self, asset: &MediaAsset) -> MediaAsset {
        let outcome = match download_file(&self.client, &asset.url, &asset.destination).await {
            Ok(bytes) => AssetOutcome::Saved { bytes },
            Err(e) => {
                warn!("message {}: {}", asset.source_message_id, e);
                AssetOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        MediaAsset {
            outcome,
            ..asset.clone()
        }
    }
}

/// GET `url` and write the body to `path`. Returns the byte count.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<u64, HarvestError> {
    let failure = |reason: String| HarvestError::Download {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failure(format!("HTTP {}", response.status())));
    }
    let body = response.bytes().await.map_err(|e| failure(e.to_string()))?;
    tokio::fs::write(path, &body)
        .await
        .map_err(|e| failure(format!("write {}: {}", path.display(), e)))?;

    debug!("saved {} ({} bytes)", path.display(), body.len());
    Ok(body.len() as u64)
}
