//! Normalized server, channel and message records.
//!
//! These are what the harvester produces and what gets written to
//! `messages.json`; field names serialize in camelCase.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01).
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Creation time encoded in a snowflake id.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw = id.parse::<u64>().ok()?;
    let millis = i64::try_from(raw >> 22).ok()? + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub member_count: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Platform channel type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Text,
    Voice,
    Category,
    Announcement,
    AnnouncementThread,
    PublicThread,
    PrivateThread,
    StageVoice,
    Directory,
    Forum,
    Media,
    Unknown(u8),
}

impl ChannelType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelType::Text,
            2 => ChannelType::Voice,
            4 => ChannelType::Category,
            5 => ChannelType::Announcement,
            10 => ChannelType::AnnouncementThread,
            11 => ChannelType::PublicThread,
            12 => ChannelType::PrivateThread,
            13 => ChannelType::StageVoice,
            14 => ChannelType::Directory,
            15 => ChannelType::Forum,
            16 => ChannelType::Media,
            other => ChannelType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ChannelType::Text => 0,
            ChannelType::Voice => 2,
            ChannelType::Category => 4,
            ChannelType::Announcement => 5,
            ChannelType::AnnouncementThread => 10,
            ChannelType::PublicThread => 11,
            ChannelType::PrivateThread => 12,
            ChannelType::StageVoice => 13,
            ChannelType::Directory => 14,
            ChannelType::Forum => 15,
            ChannelType::Media => 16,
            ChannelType::Unknown(code) => *code,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ChannelType::Text => "TEXT".to_string(),
            ChannelType::Voice => "VOICE".to_string(),
            ChannelType::Category => "CATEGORY".to_string(),
            ChannelType::Announcement => "ANNOUNCEMENT".to_string(),
            ChannelType::AnnouncementThread => "ANNOUNCEMENT_THREAD".to_string(),
            ChannelType::PublicThread => "PUBLIC_THREAD".to_string(),
            ChannelType::PrivateThread => "PRIVATE_THREAD".to_string(),
            ChannelType::StageVoice => "STAGE_VOICE".to_string(),
            ChannelType::Directory => "DIRECTORY".to_string(),
            ChannelType::Forum => "FORUM".to_string(),
            ChannelType::Media => "MEDIA".to_string(),
            ChannelType::Unknown(code) => format!("UNKNOWN({})", code),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelType::Text | ChannelType::Announcement => ChannelKind::Flat,
            ChannelType::Forum | ChannelType::Media => ChannelKind::ThreadBased,
            _ => ChannelKind::Unsupported,
        }
    }
}

impl Serialize for ChannelType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ChannelType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(ChannelType::from_code)
    }
}

/// Which harvesting algorithm applies to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Linear history paginated with a `before` cursor.
    Flat,
    /// Forum/media channel whose content lives in threads.
    ThreadBased,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        self.channel_type.kind()
    }

    pub fn is_harvestable(&self) -> bool {
        self.kind() != ChannelKind::Unsupported
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub name: String,
    pub parent_channel_id: String,
}

/// Active and archived threads of one forum/media channel.
#[derive(Debug, Clone, Default)]
pub struct ThreadSet {
    pub active: Vec<Thread>,
    pub archived: Vec<Thread>,
}

impl ThreadSet {
    /// Merged candidate list, active threads first.
    pub fn into_candidates(self) -> Vec<Thread> {
        let mut threads = self.active;
        threads.extend(self.archived);
        threads
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    /// Thumbnail URL.
    pub thumbnail: Option<String>,
    /// Image URL.
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    pub content: String,
    pub author: Author,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    pub created_at: DateTime<Utc>,
}

/// Where a media asset was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Attachment,
    EmbedImage,
    EmbedThumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Pending,
    Saved { bytes: u64 },
    Failed { reason: String },
}

/// One download task derived from an attachment or embed.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub source_message_id: String,
    pub url: String,
    pub destination: PathBuf,
    pub kind: AssetKind,
    pub outcome: AssetOutcome,
}
