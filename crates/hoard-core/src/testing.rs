//! In-memory [`SessionClient`] for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use hoard_auth_bridge::Credential;

use crate::models::{Author, Channel, ChannelType, Message, ServerInfo, Thread, ThreadSet};
use crate::session::{CurrentUser, MessageQuery, SessionClient, SessionError};

pub fn channel(id: &str, name: &str, channel_type: ChannelType) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        channel_type,
        parent_id: None,
        parent_name: None,
        guild_id: Some("g1".to_string()),
    }
}

pub fn message(id: u64) -> Message {
    Message {
        id: id.to_string(),
        thread_id: None,
        thread_name: None,
        content: format!("message {}", id),
        author: Author {
            id: "u1".to_string(),
            username: "alice".to_string(),
            discriminator: "0001".to_string(),
            avatar: None,
        },
        attachments: Vec::new(),
        embeds: Vec::new(),
        created_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
    }
}

/// Newest-first history with ids `count..=1`.
pub fn history(count: u64) -> Vec<Message> {
    (1..=count).rev().map(message).collect()
}

pub fn thread(id: &str, parent: &str) -> Thread {
    Thread {
        id: id.to_string(),
        name: format!("thread {}", id),
        parent_channel_id: parent.to_string(),
    }
}

#[derive(Default)]
pub struct FakeSession {
    pub guild: Option<ServerInfo>,
    pub channels: Vec<Channel>,
    /// Newest-first history per channel or thread id.
    pub history: HashMap<String, Vec<Message>>,
    pub threads: HashMap<String, ThreadSet>,
    /// Ids whose message fetch fails.
    pub failing: HashSet<String>,
    /// Fail a channel's message fetch once this many pages were served.
    pub fail_after_pages: HashMap<String, usize>,
    pub reject_login: bool,
    pub requests: Mutex<Vec<MessageQuery>>,
    pub served_pages: Mutex<HashMap<String, usize>>,
    pub closed: AtomicBool,
}

impl FakeSession {
    pub fn with_history(mut self, id: &str, messages: Vec<Message>) -> Self {
        self.history.insert(id.to_string(), messages);
        self
    }

    pub fn page_requests(&self) -> Vec<MessageQuery> {
        self.requests.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionClient for FakeSession {
    async fn login(&self, _credential: &Credential) -> Result<CurrentUser, SessionError> {
        if self.reject_login {
            return Err(SessionError::Unauthorized);
        }
        Ok(CurrentUser {
            id: "me".to_string(),
            username: "harvester".to_string(),
            discriminator: "0".to_string(),
        })
    }

    async fn fetch_guild(&self, guild_id: &str) -> Result<ServerInfo, SessionError> {
        self.guild
            .clone()
            .ok_or_else(|| SessionError::NotFound(guild_id.to_string()))
    }

    async fn fetch_channels(&self, _guild_id: &str) -> Result<Vec<Channel>, SessionError> {
        Ok(self.channels.clone())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, SessionError> {
        self.channels
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(channel_id.to_string()))
    }

    async fn fetch_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, SessionError> {
        self.requests.lock().unwrap().push(query.clone());
        if self.failing.contains(channel_id) {
            return Err(SessionError::Forbidden(channel_id.to_string()));
        }

        let mut served = self.served_pages.lock().unwrap();
        let count = served.entry(channel_id.to_string()).or_insert(0);
        if let Some(limit) = self.fail_after_pages.get(channel_id) {
            if *count >= *limit {
                return Err(SessionError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
        }
        *count += 1;

        let all = self.history.get(channel_id).cloned().unwrap_or_default();
        let start = match &query.before {
            Some(cursor) => all
                .iter()
                .position(|m| &m.id == cursor)
                .map(|i| i + 1)
                .unwrap_or(all.len()),
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(query.limit).collect())
    }

    async fn fetch_threads(&self, channel: &Channel) -> Result<ThreadSet, SessionError> {
        self.threads
            .get(&channel.id)
            .cloned()
            .ok_or_else(|| SessionError::Forbidden(channel.id.clone()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
