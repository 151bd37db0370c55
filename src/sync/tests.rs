use super::*;
use crate::store::MemoryStore;
use serde_json::json;

const LEAD: &str = "7";

fn msg_row(id: u32, lead: &str, ts: &str) -> serde_json::Value {
    json!({"id": id, "cliente_id": lead, "mensagem_cliente": format!("m{}", id), "timestamp": ts})
}

fn settings() -> SyncSettings {
    SyncSettings {
        refetch_interval: Duration::from_millis(5_000),
        stale_time: Duration::from_millis(4_000),
        recent_window: chrono::Duration::hours(24),
    }
}

fn setup() -> (Arc<MemoryStore>, ChangeFeed, ConversationSync) {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        MESSAGES_TABLE,
        vec![
            msg_row(2, LEAD, "2025-03-01T10:00:05Z"),
            msg_row(1, LEAD, "2025-03-01T10:00:00Z"),
            msg_row(3, "8", "2025-03-01T10:00:01Z"),
        ],
    );
    let feed = ChangeFeed::default();
    let sync = ConversationSync::new(store.clone(), feed.clone(), settings());
    (store, feed, sync)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_fetch_conversation_filters_and_orders() {
    let (store, _, _) = setup();
    let ids: Vec<_> = fetch_conversation(store.as_ref(), LEAD)
        .await
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_fetch_conversation_orders_by_fallback_timestamp() {
    let store = MemoryStore::new();
    store.seed(
        MESSAGES_TABLE,
        vec![
            json!({"id": "a", "cliente_id": LEAD, "timestamp": "2025-03-01T10:00:05Z"}),
            json!({"id": "b", "cliente_id": LEAD, "created_at": "2025-03-01T09:00:00Z"}),
        ],
    );
    let ids: Vec<_> = fetch_conversation(&store, LEAD)
        .await
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn test_fetch_failure_degrades_to_empty() {
    let (store, _, _) = setup();
    store.set_failing(true);
    assert!(fetch_conversation(store.as_ref(), LEAD).await.is_empty());
}

#[test]
fn test_settings_from_config() {
    let s = SyncSettings::from(&SyncConfig::default());
    assert_eq!(s.refetch_interval, Duration::from_secs(5));
    assert_eq!(s.stale_time, Duration::from_secs(4));
    assert_eq!(s.recent_window, chrono::Duration::hours(24));
}

#[tokio::test(start_paused = true)]
async fn test_freshness_window() {
    let mut freshness = Freshness::new(Duration::from_secs(4));
    let start = Instant::now();
    assert!(!freshness.is_fresh(start));
    freshness.mark(start);
    assert!(freshness.is_fresh(start + Duration::from_secs(3)));
    assert!(!freshness.is_fresh(start + Duration::from_secs(4)));
    freshness.invalidate();
    assert!(freshness.fresh_until().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watch_fetches_immediately() {
    let (store, _, sync) = setup();
    let mut watch = sync.watch(LEAD);
    assert!(watch.changed().await);
    let ids: Vec<_> = watch.messages().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(store.select_count(), 1);
    assert_eq!(watch.lead_id(), LEAD);
}

#[tokio::test(start_paused = true)]
async fn test_empty_conversation_still_published() {
    let (_, _, sync) = setup();
    let mut watch = sync.watch("unknown");
    assert!(watch.changed().await);
    assert!(watch.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interval_picks_up_new_rows() {
    let (store, _, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    store.seed(MESSAGES_TABLE, vec![msg_row(4, LEAD, "2025-03-01T10:00:09Z")]);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(store.select_count(), 2);
    assert_eq!(watch.messages().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_poll_does_not_notify() {
    let (store, _, sync) = setup();
    let mut rx = {
        let watch = sync.watch(LEAD);
        let mut rx = watch.subscribe();
        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(store.select_count(), 2);
        assert!(!rx.has_changed().unwrap());
        rx
    };
    // Watch dropped: the sender goes away with the task
    settle().await;
    assert!(rx.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_push_inside_stale_window_is_deferred_not_dropped() {
    let (store, feed, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    store.seed(MESSAGES_TABLE, vec![msg_row(4, LEAD, "2025-03-01T10:00:09Z")]);
    feed.publish(ChangeEvent::messages(ChangeKind::Insert, LEAD));
    settle().await;
    assert_eq!(store.select_count(), 1, "no fetch inside the staleness window");

    // Window ends 4s after the first fetch
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(store.select_count(), 2);
    assert_eq!(watch.messages().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_triggers_collapses_to_one_fetch() {
    let (store, feed, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    for _ in 0..3 {
        feed.publish(ChangeEvent::messages(ChangeKind::Insert, LEAD));
    }
    watch.refresh();
    settle().await;
    tokio::time::sleep(Duration::from_millis(3_600)).await;
    assert_eq!(store.select_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_push_after_window_fetches_immediately() {
    let (store, feed, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    tokio::time::sleep(Duration::from_millis(4_200)).await;
    feed.publish(ChangeEvent::messages(ChangeKind::Update, LEAD));
    settle().await;
    assert_eq!(store.select_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_push_for_other_lead_ignored() {
    let (store, feed, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    tokio::time::sleep(Duration::from_millis(4_200)).await;
    feed.publish(ChangeEvent::messages(ChangeKind::Insert, "8"));
    settle().await;
    assert_eq!(store.select_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lagged_receiver_forces_refresh() {
    let store = Arc::new(MemoryStore::new());
    let feed = ChangeFeed::new(1);
    let sync = ConversationSync::new(store.clone(), feed.clone(), settings());
    let mut watch = sync.watch(LEAD);
    watch.changed().await;

    tokio::time::sleep(Duration::from_millis(4_200)).await;
    // Both events concern other leads; overflowing the buffer still refreshes
    feed.publish(ChangeEvent::messages(ChangeKind::Insert, "8"));
    feed.publish(ChangeEvent::messages(ChangeKind::Insert, "9"));
    settle().await;
    assert_eq!(store.select_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_tears_down_refresh() {
    let (store, feed, sync) = setup();
    let mut watch = sync.watch(LEAD);
    watch.changed().await;
    assert_eq!(feed.subscriber_count(), 1);

    drop(watch);
    settle().await;
    assert_eq!(feed.subscriber_count(), 0);

    feed.publish(ChangeEvent::messages(ChangeKind::Insert, LEAD));
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(store.select_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_publishes_empty() {
    let (store, _, sync) = setup();
    store.set_failing(true);
    let mut watch = sync.watch(LEAD);
    assert!(watch.changed().await);
    assert!(watch.messages().is_empty());

    store.set_failing(false);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(watch.messages().len(), 2);
}
