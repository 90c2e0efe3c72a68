//! URL extraction from harvested messages.
//!
//! [`UrlProcessor`] is the hook run after each channel's media batch. The
//! shipped [`LinkCatalog`] records the links it finds in `links.json`; it
//! does not fetch them.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::export::write_json;
use crate::models::Message;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"'`)\]]+"#).unwrap_or_else(|e| panic!("invalid url pattern: {}", e))
});

const MEGA_HOSTS: &[&str] = &["mega.nz", "mega.co.nz", "mega.io"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UrlStats {
    pub total: usize,
    pub mega: usize,
    pub other: usize,
}

impl UrlStats {
    pub fn add(&mut self, other: UrlStats) {
        self.total += other.total;
        self.mega += other.mega;
        self.other += other.other;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Mega,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub message_id: String,
    pub url: String,
    pub kind: LinkKind,
}

#[async_trait]
pub trait UrlProcessor: Send + Sync {
    async fn process(&self, messages: &[Message], channel_dir: &Path) -> UrlStats;
}

pub fn classify(url: &str) -> LinkKind {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    match host {
        Some(host)
            if MEGA_HOSTS
                .iter()
                .any(|m| host == *m || host.ends_with(&format!(".{}", m))) =>
        {
            LinkKind::Mega
        }
        _ => LinkKind::Other,
    }
}

/// Distinct links per message, from content and embed text.
pub fn extract_links(messages: &[Message]) -> Vec<Link> {
    let mut links = Vec::new();
    for message in messages {
        let mut seen = HashSet::new();
        let mut sources: Vec<&str> = vec![message.content.as_str()];
        for embed in &message.embeds {
            sources.extend(embed.url.as_deref());
            sources.extend(embed.description.as_deref());
            sources.extend(embed.fields.iter().map(|f| f.value.as_str()));
        }

        for text in sources {
            for found in URL_PATTERN.find_iter(text) {
                let url = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
                if seen.insert(url.to_string()) {
                    links.push(Link {
                        message_id: message.id.clone(),
                        url: url.to_string(),
                        kind: classify(url),
                    });
                }
            }
        }
    }
    links
}

pub struct LinkCatalog;

#[derive(Serialize)]
struct CatalogFile<'a> {
    #[serde(flatten)]
    stats: UrlStats,
    links: &'a [Link],
}

#[async_trait]
impl UrlProcessor for LinkCatalog {
    async fn process(&self, messages: &[Message], channel_dir: &Path) -> UrlStats {
        let links = extract_links(messages);
        let mega = links.iter().filter(|l| l.kind == LinkKind::Mega).count();
        let stats = UrlStats {
            total: links.len(),
            mega,
            other: links.len() - mega,
        };

        let file = CatalogFile {
            stats,
            links: &links,
        };
        let path = channel_dir.join("links.json");
        if let Err(e) = write_json(&file, &path).await {
            warn!("failed to write {}: {}", path.display(), e);
        }
        stats
    }
}
