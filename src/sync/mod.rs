//! Conversation Synchronizer.
//!
//! Keeps one lead's conversation fresh from two trigger sources: a fixed
//! refetch interval and change events pushed through the [`ChangeFeed`].
//! Both go through a single refresh path guarded by a staleness window, so
//! triggers that land close together cost one fetch.

pub mod feed;
pub mod recent;
pub mod relay;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::config::SyncConfig;
use crate::models::{MESSAGE_LEAD_COLUMN, MESSAGES_TABLE, Message};
use crate::store::{DataStore, Direction, Query};

pub use feed::{ChangeEvent, ChangeFeed, ChangeKind};
pub use recent::RecentConversations;
pub use relay::ChangeRelay;

/// Every message of `lead_id`, oldest first. Read failures are logged and
/// yield an empty conversation.
pub async fn fetch_conversation(store: &dyn DataStore, lead_id: &str) -> Vec<Message> {
    let query = Query::table(MESSAGES_TABLE)
        .eq(MESSAGE_LEAD_COLUMN, lead_id)
        .order("timestamp", Direction::Asc);
    match store.select(&query).await {
        Ok(rows) => {
            let mut messages = Message::from_rows(&rows);
            // Rows ordered by `timestamp` may still fall back to `created_at`
            messages.sort_by_key(|m| m.timestamp);
            messages
        }
        Err(e) => {
            error!("failed to load conversation for lead {}: {}", lead_id, e);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub refetch_interval: Duration,
    pub stale_time: Duration,
    pub recent_window: chrono::Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            refetch_interval: Duration::from_millis(config.refetch_interval_ms),
            stale_time: Duration::from_millis(config.stale_time_ms),
            recent_window: i64::try_from(config.recent_window_hours)
                .ok()
                .and_then(chrono::Duration::try_hours)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Tracks when data was last fetched and how long it stays valid.
#[derive(Debug, Clone)]
pub(crate) struct Freshness {
    stale_time: Duration,
    fetched_at: Option<Instant>,
}

impl Freshness {
    pub(crate) fn new(stale_time: Duration) -> Self {
        Self {
            stale_time,
            fetched_at: None,
        }
    }

    pub(crate) fn mark(&mut self, now: Instant) {
        self.fetched_at = Some(now);
    }

    pub(crate) fn invalidate(&mut self) {
        self.fetched_at = None;
    }

    /// End of the current validity window, if data was ever fetched.
    pub(crate) fn fresh_until(&self) -> Option<Instant> {
        self.fetched_at.map(|at| at + self.stale_time)
    }

    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        self.fresh_until().is_some_and(|until| now < until)
    }
}

/// Starts per-lead watches sharing one store, feed and timing policy.
#[derive(Clone)]
pub struct ConversationSync {
    store: Arc<dyn DataStore>,
    feed: ChangeFeed,
    settings: SyncSettings,
}

impl ConversationSync {
    pub fn new(store: Arc<dyn DataStore>, feed: ChangeFeed, settings: SyncSettings) -> Self {
        Self {
            store,
            feed,
            settings,
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Begin synchronizing `lead_id`. The first fetch starts immediately;
    /// dropping the returned watch stops every timer and subscription.
    pub fn watch(&self, lead_id: &str) -> ConversationWatch {
        let (tx, rx) = watch::channel(Vec::new());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        // Subscribe before spawning so no event published after this call is missed
        let changes = self.feed.subscribe();
        let task = SyncTask {
            store: self.store.clone(),
            lead_id: lead_id.to_string(),
            settings: self.settings,
            changes,
            refresh_rx,
            tx,
        };
        let handle = tokio::spawn(task.run());
        debug!("started conversation sync for lead {}", lead_id);
        ConversationWatch {
            lead_id: lead_id.to_string(),
            rx,
            refresh_tx,
            handle,
        }
    }
}

/// Live view of one lead's conversation. Dropping it tears down the
/// background refresh task.
pub struct ConversationWatch {
    lead_id: String,
    rx: watch::Receiver<Vec<Message>>,
    refresh_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ConversationWatch {
    pub fn lead_id(&self) -> &str {
        &self.lead_id
    }

    /// Latest synchronized conversation, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published conversation. Returns `false` once the
    /// refresh task has stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.rx.clone()
    }

    /// Ask for a refresh, subject to the staleness window.
    pub fn refresh(&self) {
        // A full channel already holds a pending request
        let _ = self.refresh_tx.try_send(());
    }
}

impl Drop for ConversationWatch {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("stopped conversation sync for lead {}", self.lead_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Interval,
    Change,
    Manual,
    Deferred,
}

struct SyncTask {
    store: Arc<dyn DataStore>,
    lead_id: String,
    settings: SyncSettings,
    changes: broadcast::Receiver<ChangeEvent>,
    refresh_rx: mpsc::Receiver<()>,
    tx: watch::Sender<Vec<Message>>,
}

impl SyncTask {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.refetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut freshness = Freshness::new(self.settings.stale_time);
        let mut deferred: Option<Instant> = None;
        let mut feed_open = true;
        let mut manual_open = true;
        let mut published = false;

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Interval,
                received = self.changes.recv(), if feed_open => match received {
                    Ok(event) if event.concerns_lead(&self.lead_id) => Trigger::Change,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "conversation sync for lead {} lagged by {} events, refreshing",
                            self.lead_id, skipped
                        );
                        Trigger::Change
                    }
                    Err(RecvError::Closed) => {
                        debug!("change feed closed, lead {} falls back to polling", self.lead_id);
                        feed_open = false;
                        continue;
                    }
                },
                request = self.refresh_rx.recv(), if manual_open => match request {
                    Some(()) => Trigger::Manual,
                    None => {
                        manual_open = false;
                        continue;
                    }
                },
                () = wait_until(deferred) => Trigger::Deferred,
            };

            if trigger != Trigger::Deferred && freshness.is_fresh(Instant::now()) {
                if deferred.is_none() {
                    deferred = freshness.fresh_until();
                    debug!(
                        "{:?} trigger for lead {} inside staleness window, deferring",
                        trigger, self.lead_id
                    );
                }
                continue;
            }

            deferred = None;
            let messages = fetch_conversation(self.store.as_ref(), &self.lead_id).await;
            freshness.mark(Instant::now());
            // The first fetch always notifies, even when the conversation is empty
            let force = !published;
            published = true;
            self.tx.send_if_modified(|current| {
                if !force && *current == messages {
                    return false;
                }
                *current = messages;
                true
            });
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests;
