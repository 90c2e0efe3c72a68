//! Authenticated session seam.
//!
//! The harvester, media collector and pipeline only see this trait; the
//! shipped REST implementation is [`crate::discord::DiscordSession`].

use async_trait::async_trait;
use thiserror::Error;

use hoard_auth_bridge::Credential;

use crate::models::{Channel, Message, ServerInfo, ThreadSet};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential rejected (401); run `hoard logout` and log in again")]
    Unauthorized,

    #[error("access forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited after {0} retries")]
    RateLimited(u32),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected payload: {0}")]
    Decode(String),
}

/// Account the session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub discriminator: String,
}

impl CurrentUser {
    pub fn tag(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

/// Page request for message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    /// Only return messages strictly older than this id.
    pub before: Option<String>,
    pub limit: usize,
}

impl MessageQuery {
    pub fn latest(limit: usize) -> Self {
        Self { before: None, limit }
    }

    pub fn before(cursor: impl Into<String>, limit: usize) -> Self {
        Self {
            before: Some(cursor.into()),
            limit,
        }
    }
}

#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Authenticate. Resolves once the session is ready for requests.
    async fn login(&self, credential: &Credential) -> Result<CurrentUser, SessionError>;

    async fn fetch_guild(&self, guild_id: &str) -> Result<ServerInfo, SessionError>;

    /// Every channel of the guild, any type.
    async fn fetch_channels(&self, guild_id: &str) -> Result<Vec<Channel>, SessionError>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, SessionError>;

    /// One page of history, newest first.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, SessionError>;

    /// Active and archived threads of a forum/media channel.
    async fn fetch_threads(&self, channel: &Channel) -> Result<ThreadSet, SessionError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self);
}
