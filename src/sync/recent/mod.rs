use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{ChangeFeed, Freshness, SyncSettings};
use crate::models::{MESSAGES_TABLE, Message};
use crate::store::{DataStore, Direction, Query};

/// Messages across every lead inside the recent window, newest first.
///
/// Cached for the staleness window and invalidated by any message change,
/// whichever lead it belongs to.
pub struct RecentConversations {
    store: Arc<dyn DataStore>,
    settings: SyncSettings,
    state: Mutex<RecentState>,
}

struct RecentState {
    messages: Vec<Message>,
    freshness: Freshness,
}

impl RecentConversations {
    pub fn new(store: Arc<dyn DataStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            settings,
            state: Mutex::new(RecentState {
                messages: Vec::new(),
                freshness: Freshness::new(settings.stale_time),
            }),
        }
    }

    /// Cached messages, refetched first when stale. Concurrent callers share
    /// one fetch.
    pub async fn get(&self) -> Vec<Message> {
        let mut state = self.state.lock().await;
        if state.freshness.is_fresh(Instant::now()) {
            return state.messages.clone();
        }
        match self.fetch().await {
            Some(messages) => {
                state.messages = messages;
                state.freshness.mark(Instant::now());
                state.messages.clone()
            }
            None => Vec::new(),
        }
    }

    pub async fn invalidate(&self) {
        self.state.lock().await.freshness.invalidate();
    }

    /// Newest message per lead.
    pub async fn last_by_lead(&self) -> HashMap<String, Message> {
        let mut latest = HashMap::new();
        // Newest first, so the first message seen per lead wins
        for message in self.get().await {
            latest.entry(message.lead_id.clone()).or_insert(message);
        }
        latest
    }

    /// Leads with at least one message in the window.
    pub async fn lead_ids(&self) -> HashSet<String> {
        self.get()
            .await
            .into_iter()
            .map(|m| m.lead_id)
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Invalidate on every message change until the feed closes.
    pub fn spawn_invalidator(self: &Arc<Self>, feed: &ChangeFeed) -> JoinHandle<()> {
        let recent = Arc::clone(self);
        let mut changes = feed.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) if event.is_messages() => recent.invalidate().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => recent.invalidate().await,
                    Err(RecvError::Closed) => {
                        debug!("change feed closed, recent conversations stop invalidating");
                        break;
                    }
                }
            }
        })
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.settings.recent_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn fetch(&self) -> Option<Vec<Message>> {
        let query = Query::table(MESSAGES_TABLE).order("timestamp", Direction::Desc);
        let rows = match self.store.select(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("failed to load recent conversations: {}", e);
                return None;
            }
        };
        let cutoff = self.cutoff(Utc::now());
        let mut messages: Vec<Message> = Message::from_rows(&rows)
            .into_iter()
            .filter(|m| m.timestamp >= cutoff)
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Some(messages)
    }
}
