//! REST implementation of [`SessionClient`].
//!
//! Talks to the platform's v9 HTTP API with a user token. Payloads are
//! decoded into private `Raw*` structs and normalized into [`crate::models`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use hoard_auth_bridge::Credential;

use crate::models::{
    snowflake_timestamp, Attachment, Author, Channel, ChannelType, Embed, EmbedField, Message,
    ServerInfo, Thread, ThreadSet,
};
use crate::session::{CurrentUser, MessageQuery, SessionClient, SessionError};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";
const CDN_BASE: &str = "https://cdn.discordapp.com";
const ARCHIVED_PAGE_SIZE: usize = 100;

pub struct DiscordSession {
    http: reqwest::Client,
    api_base: String,
    token: RwLock<Option<String>>,
}

impl DiscordSession {
    pub fn new(api_base: impl Into<String>) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(Policy::limited(5))
            .build()?;
        Ok(Self::with_client(http, api_base))
    }

    pub fn with_client(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    fn token(&self) -> Result<String, SessionError> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(SessionError::NotLoggedIn)
    }

    fn set_token(&self, value: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = value;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SessionError> {
        let token = self.token()?;
        self.get_json_with(&token, path, query).await
    }

    async fn get_json_with<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SessionError> {
        let url = format!("{}{}", self.api_base, path);
        let response = call_with_backoff(path, || {
            self.http
                .get(&url)
                .header(AUTHORIZATION, token)
                .query(query)
        })
        .await?;

        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::Decode(format!("{}: {}", path, e)))
    }

    async fn fetch_archived_threads(&self, channel_id: &str) -> Result<Vec<Thread>, SessionError> {
        let mut threads = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let mut query = vec![("limit", ARCHIVED_PAGE_SIZE.to_string())];
            if let Some(cursor) = before.as_ref() {
                query.push(("before", cursor.clone()));
            }

            let page: RawThreadList = self
                .get_json(&format!("/channels/{}/threads/archived/public", channel_id), &query)
                .await?;

            before = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.as_ref())
                .and_then(|m| m.archive_timestamp.clone());
            let fetched = page.threads.len();
            threads.extend(page.threads.into_iter().map(|raw| raw.into_thread(channel_id)));

            if !page.has_more.unwrap_or(false) || fetched == 0 || before.is_none() {
                break;
            }
        }

        Ok(threads)
    }
}

#[async_trait]
impl SessionClient for DiscordSession {
    async fn login(&self, credential: &Credential) -> Result<CurrentUser, SessionError> {
        let me: RawUser = self
            .get_json_with(credential.secret(), "/users/@me", &[])
            .await?;
        self.set_token(Some(credential.secret().to_string()));

        let user = CurrentUser {
            id: me.id,
            username: me.username,
            discriminator: me.discriminator.unwrap_or_default(),
        };
        info!("Logged in as {}", user.tag());
        Ok(user)
    }

    async fn fetch_guild(&self, guild_id: &str) -> Result<ServerInfo, SessionError> {
        let guild: RawGuild = self
            .get_json(
                &format!("/guilds/{}", guild_id),
                &[("with_counts", "true".to_string())],
            )
            .await?;

        let icon = guild
            .icon
            .as_deref()
            .map(|hash| guild_icon_url(&guild.id, hash));
        let created_at = snowflake_timestamp(&guild.id).unwrap_or_else(Utc::now);
        Ok(ServerInfo {
            icon,
            member_count: guild.approximate_member_count.or(guild.member_count),
            created_at,
            id: guild.id,
            name: guild.name,
        })
    }

    async fn fetch_channels(&self, guild_id: &str) -> Result<Vec<Channel>, SessionError> {
        let raw: Vec<RawChannel> = self
            .get_json(&format!("/guilds/{}/channels", guild_id), &[])
            .await?;

        let names: HashMap<String, String> = raw
            .iter()
            .filter_map(|c| c.name.clone().map(|name| (c.id.clone(), name)))
            .collect();

        Ok(raw
            .into_iter()
            .map(|c| {
                let mut channel = c.into_channel();
                channel.parent_name = channel
                    .parent_id
                    .as_ref()
                    .and_then(|id| names.get(id))
                    .cloned();
                if channel.guild_id.is_none() {
                    channel.guild_id = Some(guild_id.to_string());
                }
                channel
            })
            .collect())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, SessionError> {
        let raw: RawChannel = self
            .get_json(&format!("/channels/{}", channel_id), &[])
            .await?;
        Ok(raw.into_channel())
    }

    async fn fetch_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, SessionError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(before) = query.before.as_ref() {
            params.push(("before", before.clone()));
        }

        let raw: Vec<RawMessage> = self
            .get_json(&format!("/channels/{}/messages", channel_id), &params)
            .await?;
        Ok(raw.into_iter().map(RawMessage::into_message).collect())
    }

    async fn fetch_threads(&self, channel: &Channel) -> Result<ThreadSet, SessionError> {
        let guild_id = match channel.guild_id.clone() {
            Some(id) => id,
            None => self
                .fetch_channel(&channel.id)
                .await?
                .guild_id
                .ok_or_else(|| SessionError::Decode(format!("channel {} has no guild", channel.id)))?,
        };

        let listing: RawThreadList = self
            .get_json(&format!("/guilds/{}/threads/active", guild_id), &[])
            .await?;
        let active = listing
            .threads
            .into_iter()
            .filter(|t| t.parent_id.as_deref() == Some(channel.id.as_str()))
            .map(|raw| raw.into_thread(&channel.id))
            .collect();

        let archived = self.fetch_archived_threads(&channel.id).await?;
        Ok(ThreadSet { active, archived })
    }

    async fn close(&self) {
        self.set_token(None);
        info!("Session closed");
    }
}

/// HTTP request helper with exponential backoff for rate limiting.
pub async fn call_with_backoff<F>(
    label: &str,
    mut builder_fn: F,
) -> Result<reqwest::Response, SessionError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut retries = 0;
    let mut delay = Duration::from_secs(1);
    let max_retries = 8;

    loop {
        let response = builder_fn().send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            if retries >= max_retries {
                return Err(SessionError::RateLimited(retries));
            }

            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(delay);

            warn!("{}: rate limited, waiting {:?}", label, wait);
            sleep(wait).await;

            retries += 1;
            delay = std::cmp::min(delay * 2, Duration::from_secs(60));
            continue;
        }

        if status.is_server_error() && retries < 3 {
            warn!("{}: server error {}, retrying...", label, status);
            sleep(delay).await;
            retries += 1;
            delay *= 2;
            continue;
        }

        return Err(match status.as_u16() {
            401 => SessionError::Unauthorized,
            403 => SessionError::Forbidden(label.to_string()),
            404 => SessionError::NotFound(label.to_string()),
            code => SessionError::Status {
                status: code,
                body: response.text().await.unwrap_or_default(),
            },
        });
    }
}

/// Longest wait honoured from a `Retry-After` header.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Seconds from a `Retry-After` header, fractions allowed, capped at
/// [`MAX_RETRY_AFTER`].
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())))
}

fn cdn_extension(hash: &str) -> &'static str {
    if hash.starts_with("a_") {
        "gif"
    } else {
        "png"
    }
}

pub fn guild_icon_url(guild_id: &str, hash: &str) -> String {
    format!(
        "{}/icons/{}/{}.{}?size=4096",
        CDN_BASE,
        guild_id,
        hash,
        cdn_extension(hash)
    )
}

pub fn avatar_url(user_id: &str, hash: &str) -> String {
    format!("{}/avatars/{}/{}.{}", CDN_BASE, user_id, hash, cdn_extension(hash))
}

// --- API Response Types ---

#[derive(Debug, Clone, Deserialize)]
struct RawUser {
    id: String,
    username: String,
    discriminator: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGuild {
    id: String,
    name: String,
    icon: Option<String>,
    approximate_member_count: Option<u64>,
    member_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawThreadMetadata {
    archive_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChannel {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    parent_id: Option<String>,
    guild_id: Option<String>,
    thread_metadata: Option<RawThreadMetadata>,
}

impl RawChannel {
    fn into_channel(self) -> Channel {
        Channel {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            channel_type: ChannelType::from_code(self.kind),
            parent_id: self.parent_id,
            parent_name: None,
            guild_id: self.guild_id,
        }
    }

    fn into_thread(self, parent_channel_id: &str) -> Thread {
        Thread {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            parent_channel_id: self
                .parent_id
                .unwrap_or_else(|| parent_channel_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawThreadList {
    #[serde(default)]
    threads: Vec<RawChannel>,
    has_more: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAttachment {
    id: String,
    url: String,
    filename: String,
    #[serde(default)]
    size: u64,
    content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEmbedMedia {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEmbedField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEmbed {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    color: Option<u32>,
    timestamp: Option<String>,
    #[serde(default)]
    fields: Vec<RawEmbedField>,
    thumbnail: Option<RawEmbedMedia>,
    image: Option<RawEmbedMedia>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: RawUser,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    embeds: Vec<RawEmbed>,
    timestamp: Option<DateTime<Utc>>,
}

impl RawMessage {
    fn into_message(self) -> Message {
        let created_at = self
            .timestamp
            .or_else(|| snowflake_timestamp(&self.id))
            .unwrap_or_else(|| {
                debug!("message {} has no usable timestamp", self.id);
                Utc::now()
            });
        let avatar = self
            .author
            .avatar
            .as_deref()
            .map(|hash| avatar_url(&self.author.id, hash));

        Message {
            thread_id: None,
            thread_name: None,
            content: self.content,
            author: Author {
                avatar,
                discriminator: self.author.discriminator.unwrap_or_else(|| "0".to_string()),
                id: self.author.id,
                username: self.author.username,
            },
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    id: a.id,
                    url: a.url,
                    name: a.filename,
                    size: a.size,
                    content_type: a.content_type,
                })
                .collect(),
            embeds: self
                .embeds
                .into_iter()
                .map(|e| Embed {
                    title: e.title,
                    description: e.description,
                    url: e.url,
                    color: e.color,
                    timestamp: e.timestamp,
                    fields: e
                        .fields
                        .into_iter()
                        .map(|f| EmbedField {
                            name: f.name,
                            value: f.value,
                            inline: f.inline,
                        })
                        .collect(),
                    thumbnail: e.thumbnail.and_then(|m| m.url),
                    image: e.image.and_then(|m| m.url),
                })
                .collect(),
            created_at,
            id: self.id,
        }
    }
}
