//! Harvest error taxonomy.
//!
//! `Configuration` and `Acquisition` are fatal and surface from
//! [`crate::run_harvest`]. The rest are recovered at the smallest scope and
//! logged with the identifier they carry.

use thiserror::Error;

use hoard_auth_bridge::AuthError;

use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not obtain a session credential: {0}")]
    Acquisition(#[from] AuthError),

    #[error("failed to fetch channel {channel_id}: {source}")]
    ChannelFetch {
        channel_id: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to fetch thread {thread_id}: {source}")]
    ThreadFetch {
        thread_id: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    pub fn channel(channel_id: impl Into<String>, source: SessionError) -> Self {
        HarvestError::ChannelFetch {
            channel_id: channel_id.into(),
            source,
        }
    }

    pub fn thread(thread_id: impl Into<String>, source: SessionError) -> Self {
        HarvestError::ThreadFetch {
            thread_id: thread_id.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
