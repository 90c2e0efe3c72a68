//! Per-channel message collection.
//!
//! Flat channels page backwards through history with a `before` cursor.
//! Forum and media channels have no history of their own, so their threads
//! are enumerated and the newest page of each is taken.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::models::{Channel, ChannelKind, Message, Thread};
use crate::session::{MessageQuery, SessionClient};

/// Largest page the history endpoint returns.
pub const PAGE_SIZE: usize = 100;

/// Pagination state of one flat channel.
struct HarvestJob {
    channel_id: String,
    limit: usize,
    cursor: Option<String>,
    collected: Vec<Message>,
    seen: HashSet<String>,
}

impl HarvestJob {
    fn new(channel_id: &str, limit: usize) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            limit,
            cursor: None,
            collected: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn next_query(&self) -> MessageQuery {
        match &self.cursor {
            Some(cursor) => MessageQuery::before(cursor.clone(), PAGE_SIZE),
            None => MessageQuery::latest(PAGE_SIZE),
        }
    }

    /// Take one page. Returns whether another page should be requested.
    fn absorb(&mut self, page: Vec<Message>) -> bool {
        let fetched = page.len();
        let Some(last) = page.last() else {
            return false;
        };
        self.cursor = Some(last.id.clone());

        let before = self.collected.len();
        for message in page {
            if self.seen.insert(message.id.clone()) {
                self.collected.push(message);
            } else {
                debug!("channel {}: dropping repeated message {}", self.channel_id, message.id);
            }
        }

        if self.collected.len() >= self.limit {
            return false;
        }
        // A page with nothing new would hand back the same cursor forever.
        fetched == PAGE_SIZE && self.collected.len() > before
    }

    fn finish(mut self) -> Vec<Message> {
        self.collected.truncate(self.limit);
        self.collected
    }
}

pub struct ChannelHarvester<'a> {
    session: &'a dyn SessionClient,
}

impl<'a> ChannelHarvester<'a> {
    pub fn new(session: &'a dyn SessionClient) -> Self {
        Self { session }
    }

    /// Collect up to `limit` messages, or up to `limit` threads for
    /// forum/media channels. Never fails: fetch errors are logged and the
    /// messages gathered so far are returned.
    pub async fn collect(&self, channel: &Channel, limit: usize) -> Vec<Message> {
        if limit == 0 {
            return Vec::new();
        }
        match channel.kind() {
            ChannelKind::Flat => self.collect_flat(channel, limit).await,
            ChannelKind::ThreadBased => self.collect_threads(channel, limit).await,
            ChannelKind::Unsupported => {
                warn!(
                    "Channel {} ({}) is not a supported type: {}",
                    channel.name,
                    channel.id,
                    channel.channel_type.display_name()
                );
                Vec::new()
            }
        }
    }

    async fn collect_flat(&self, channel: &Channel, limit: usize) -> Vec<Message> {
        let mut job = HarvestJob::new(&channel.id, limit);

        loop {
            let query = job.next_query();
            match self.session.fetch_messages(&job.channel_id, &query).await {
                Ok(page) => {
                    if !job.absorb(page) {
                        break;
                    }
                    debug!("#{}: {} messages so far", channel.name, job.collected.len());
                }
                Err(e) => {
                    warn!("{}", HarvestError::channel(&channel.id, e));
                    break;
                }
            }
        }

        job.finish()
    }

    async fn collect_threads(&self, channel: &Channel, limit: usize) -> Vec<Message> {
        info!("  Forum/media channel detected: {}", channel.name);

        let threads = match self.session.fetch_threads(channel).await {
            Ok(set) => set,
            Err(e) => {
                warn!("{}", HarvestError::channel(&channel.id, e));
                return Vec::new();
            }
        };
        info!(
            "  Found {} active and {} archived threads",
            threads.active.len(),
            threads.archived.len()
        );

        let candidates = threads.into_candidates();
        let total = candidates.len().min(limit);
        let mut messages = Vec::new();

        for (index, thread) in candidates.into_iter().take(limit).enumerate() {
            info!("    Processing thread ({}/{}): {}", index + 1, total, thread.name);
            match self
                .session
                .fetch_messages(&thread.id, &MessageQuery::latest(PAGE_SIZE))
                .await
            {
                Ok(page) => messages.extend(tag_thread(page, &thread)),
                Err(e) => warn!("{}", HarvestError::thread(&thread.id, e)),
            }
        }

        messages
    }
}

fn tag_thread<'t>(page: Vec<Message>, thread: &'t Thread) -> impl Iterator<Item = Message> + 't {
    page.into_iter().take(PAGE_SIZE).map(move |mut message| {
        message.thread_id = Some(thread.id.clone());
        message.thread_name = Some(thread.name.clone());
        message
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelType, ThreadSet};
    use crate::testing::{channel, history, message, thread, FakeSession};

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_flat_returns_newest_prefix() {
        for (available, limit) in [(0u64, 10usize), (30, 1000), (100, 100), (250, 1000), (250, 120)] {
            let session = FakeSession::default().with_history("c1", history(available));
            let harvester = ChannelHarvester::new(&session);
            let got = harvester
                .collect(&channel("c1", "general", ChannelType::Text), limit)
                .await;

            let expected = limit.min(available as usize);
            assert_eq!(got.len(), expected, "available={} limit={}", available, limit);
            let want: Vec<String> = history(available)
                .into_iter()
                .take(expected)
                .map(|m| m.id)
                .collect();
            assert_eq!(ids(&got), want);
        }
    }

    #[tokio::test]
    async fn test_limit_fifty_of_two_hundred() {
        let session = FakeSession::default().with_history("c1", history(200));
        let got = ChannelHarvester::new(&session)
            .collect(&channel("c1", "general", ChannelType::Text), 50)
            .await;

        assert_eq!(got.len(), 50);
        assert_eq!(got[0].id, "200");
        assert_eq!(got.last().unwrap().id, "151");
        assert_eq!(session.page_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_last_id_of_previous_page() {
        let session = FakeSession::default().with_history("c1", history(250));
        ChannelHarvester::new(&session)
            .collect(&channel("c1", "general", ChannelType::Text), 1000)
            .await;

        let requests = session.page_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], MessageQuery::latest(100));
        assert_eq!(requests[1], MessageQuery::before("151", 100));
        assert_eq!(requests[2], MessageQuery::before("51", 100));
    }

    #[tokio::test]
    async fn test_repeated_ids_dropped() {
        let mut messages = history(100);
        messages[99] = message(100);
        let session = FakeSession::default().with_history("c1", messages);
        let got = ChannelHarvester::new(&session)
            .collect(&channel("c1", "general", ChannelType::Text), 1000)
            .await;

        let unique: HashSet<_> = got.iter().map(|m| m.id.clone()).collect();
        assert_eq!(unique.len(), got.len());
        assert_eq!(got.len(), 99);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_partial_history() {
        let mut session = FakeSession::default().with_history("c1", history(300));
        session.fail_after_pages.insert("c1".to_string(), 2);
        let got = ChannelHarvester::new(&session)
            .collect(&channel("c1", "general", ChannelType::Text), 1000)
            .await;

        assert_eq!(got.len(), 200);
        assert_eq!(got.last().unwrap().id, "101");
    }

    #[tokio::test]
    async fn test_zero_limit_fetches_nothing() {
        let session = FakeSession::default().with_history("c1", history(10));
        let got = ChannelHarvester::new(&session)
            .collect(&channel("c1", "general", ChannelType::Text), 0)
            .await;
        assert!(got.is_empty());
        assert!(session.page_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_channel_is_empty() {
        let session = FakeSession::default().with_history("v1", history(10));
        let got = ChannelHarvester::new(&session)
            .collect(&channel("v1", "voice", ChannelType::Voice), 100)
            .await;
        assert!(got.is_empty());
        assert!(session.page_requests().is_empty());
    }

    #[tokio::test]
    async fn test_forum_limit_counts_threads() {
        let mut session = FakeSession::default();
        session.threads.insert(
            "f1".to_string(),
            ThreadSet {
                active: vec![thread("t1", "f1"), thread("t2", "f1")],
                archived: vec![thread("t3", "f1"), thread("t4", "f1")],
            },
        );
        for id in ["t1", "t2", "t3", "t4"] {
            session.history.insert(id.to_string(), history(150));
        }

        let got = ChannelHarvester::new(&session)
            .collect(&channel("f1", "showcase", ChannelType::Forum), 3)
            .await;

        let threads: HashSet<_> = got.iter().filter_map(|m| m.thread_id.clone()).collect();
        assert_eq!(threads.len(), 3);
        assert!(!threads.contains("t4"));
        assert_eq!(got.len(), 300);
        for id in ["t1", "t2", "t3"] {
            let per_thread = got.iter().filter(|m| m.thread_id.as_deref() == Some(id)).count();
            assert!(per_thread <= PAGE_SIZE);
        }
        assert_eq!(got[0].thread_name.as_deref(), Some("thread t1"));
    }

    #[tokio::test]
    async fn test_failing_thread_is_skipped() {
        let mut session = FakeSession::default();
        session.threads.insert(
            "m1".to_string(),
            ThreadSet {
                active: vec![thread("t1", "m1")],
                archived: vec![thread("bad", "m1"), thread("t3", "m1")],
            },
        );
        session.history.insert("t1".to_string(), history(2));
        session.history.insert("t3".to_string(), history(5));
        session.failing.insert("bad".to_string());

        let got = ChannelHarvester::new(&session)
            .collect(&channel("m1", "gallery", ChannelType::Media), 10)
            .await;
        assert_eq!(got.len(), 7);
        assert!(got.iter().all(|m| m.thread_id.as_deref() != Some("bad")));
    }

    #[tokio::test]
    async fn test_thread_listing_failure_is_empty() {
        let session = FakeSession::default();
        let got = ChannelHarvester::new(&session)
            .collect(&channel("f1", "showcase", ChannelType::Forum), 10)
            .await;
        assert!(got.is_empty());
    }
}
