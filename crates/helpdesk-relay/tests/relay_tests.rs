//! Relay behaviour against the in-memory outbox.

use std::sync::Arc;
use std::time::Duration;

use helpdesk_core::cascade::{CascadeRouter, CascadeRule, OutgoingMessage};
use helpdesk_core::error::DomainError;
use async_trait::async_trait;
use helpdesk_core::outbox::{MessageHandler, OutboxEntry, OutboxStatus, OutboxStore};
use helpdesk_core::pipeline::AppendPipeline;
use helpdesk_core::repository::{EventRepository, StoredEvent};
use helpdesk_core::retry::RetryPolicy;
use helpdesk_event_store::InMemoryEventStore;
use helpdesk_relay::{HandlerRegistry, OutboxRelay, RelayConfig, RelayReport};
use helpdesk_test_support::{RecordingHandler, stored_event};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const INBOX: &str = "inbox";
const NOTED: &str = "test.noted";

fn forward_to_inbox(event: &StoredEvent) -> Result<Option<OutgoingMessage>, DomainError> {
    let key = event.payload["key"].as_str().unwrap_or_default().to_owned();
    OutgoingMessage::caused_by(event, INBOX, "Noted", key, &event.payload).map(Some)
}

fn store() -> InMemoryEventStore {
    InMemoryEventStore::new(AppendPipeline::new(
        vec![],
        CascadeRouter::new(vec![CascadeRule {
            name: "forward_to_inbox",
            event_type: NOTED,
            map: forward_to_inbox,
        }]),
    ))
}

/// Appends `count` events to a fresh stream, each queuing one inbox message
/// with ordering key `key`.
async fn enqueue(store: &InMemoryEventStore, key: &str, count: i64) {
    let stream_id = Uuid::new_v4();
    let events: Vec<StoredEvent> = (1..=count)
        .map(|seq| {
            stored_event(
                stream_id,
                seq,
                NOTED,
                serde_json::json!({ "key": key, "seq": seq }),
            )
        })
        .collect();
    store.append_events(stream_id, 0, &events).await.unwrap();
}

fn config(max_in_flight: usize) -> RelayConfig {
    RelayConfig {
        max_in_flight,
        poll_interval: Duration::from_millis(5),
        dispatch_timeout: Duration::from_secs(1),
        lease: Duration::from_secs(30),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(vec![Duration::from_millis(1), Duration::from_millis(1)])
}

fn relay(store: &InMemoryEventStore, handler: Arc<RecordingHandler>, config: RelayConfig) -> OutboxRelay {
    OutboxRelay::new(
        Arc::new(store.clone()),
        HandlerRegistry::new().with_handler(INBOX, handler),
        config,
    )
    .with_retry(fast_retry())
}

async fn drain(relay: &OutboxRelay, store: &InMemoryEventStore) {
    for _ in 0..50 {
        if store.pending_count().await.unwrap() == 0 {
            return;
        }
        relay.run_once().await.unwrap();
    }
    panic!("outbox did not drain");
}

#[tokio::test]
async fn test_entries_with_one_key_are_delivered_in_order_without_overlap() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 3).await;
    enqueue(&store, "b", 2).await;
    let handler = Arc::new(RecordingHandler::new().with_delay(Duration::from_millis(5)));
    let relay = relay(&store, handler.clone(), config(8));

    // Act
    drain(&relay, &store).await;

    // Assert
    let seqs = |key: &str| -> Vec<i64> {
        handler
            .delivered_payloads(key)
            .iter()
            .map(|p| p["seq"].as_i64().unwrap())
            .collect()
    };
    assert_eq!(seqs("a"), vec![1, 2, 3]);
    assert_eq!(seqs("b"), vec![1, 2]);
    assert_eq!(handler.overlaps(), 0);
}

#[tokio::test]
async fn test_one_pass_delivers_one_entry_per_key() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 2).await;
    enqueue(&store, "b", 2).await;
    enqueue(&store, "c", 1).await;
    let handler = Arc::new(RecordingHandler::new());
    let relay = relay(&store, handler.clone(), config(8));

    // Act
    let report = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(
        report,
        RelayReport {
            claimed: 3,
            acknowledged: 3,
            released: 0,
        }
    );
    assert_eq!(store.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_batch_size_is_bounded_by_max_in_flight() {
    let store = store();
    for key in ["a", "b", "c", "d"] {
        enqueue(&store, key, 1).await;
    }
    let handler = Arc::new(RecordingHandler::new());
    let relay = relay(&store, handler.clone(), config(2));

    let report = relay.run_once().await.unwrap();

    assert_eq!(report.claimed, 2);
    assert_eq!(handler.delivered().len(), 2);
}

#[tokio::test]
async fn test_transient_failure_is_retried_within_the_pass() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 1).await;
    let handler = Arc::new(RecordingHandler::new().failing_first(2));
    let relay = relay(&store, handler.clone(), config(8));

    // Act
    let report = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(report.acknowledged, 1);
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn test_failed_delivery_is_released_and_redelivered_later() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 2).await;
    let handler = Arc::new(RecordingHandler::new().failing_first(1));
    let relay = relay(&store, handler.clone(), config(8)).with_retry(RetryPolicy::never());

    // Act
    let first = relay.run_once().await.unwrap();
    let entries = store.outbox_entries();
    let second = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(first.released, 1);
    assert_eq!(entries[0].status, OutboxStatus::Pending);
    assert!(entries[0].last_error.is_some());
    assert_eq!(entries[1].status, OutboxStatus::Pending);

    assert_eq!(second.acknowledged, 1);
    let entries = store.outbox_entries();
    assert_eq!(entries[0].status, OutboxStatus::Acknowledged);
    assert_eq!(entries[0].attempts, 2);
    assert_eq!(handler.delivered_payloads("a")[0]["seq"], 1);
}

#[tokio::test]
async fn test_unregistered_destination_is_released_with_reason() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 1).await;
    let relay = OutboxRelay::new(Arc::new(store.clone()), HandlerRegistry::new(), config(8))
        .with_retry(RetryPolicy::never());

    // Act
    let report = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(report.released, 1);
    let entry = &store.outbox_entries()[0];
    assert_eq!(entry.status, OutboxStatus::Pending);
    assert!(
        entry
            .last_error
            .as_deref()
            .unwrap()
            .contains("no handler registered for destination inbox")
    );
}

#[tokio::test]
async fn test_slow_delivery_times_out_and_is_released() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 1).await;
    let handler = Arc::new(RecordingHandler::new().with_delay(Duration::from_millis(200)));
    let relay = relay(
        &store,
        handler.clone(),
        RelayConfig {
            dispatch_timeout: Duration::from_millis(10),
            ..config(8)
        },
    )
    .with_retry(RetryPolicy::never());

    // Act
    let report = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(report.released, 1);
    assert!(handler.delivered().is_empty());
    assert!(
        store.outbox_entries()[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("timed out")
    );
}

#[tokio::test]
async fn test_run_drains_outbox_and_stops_on_cancel() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 3).await;
    enqueue(&store, "b", 3).await;
    let handler = Arc::new(RecordingHandler::new());
    let relay = Arc::new(relay(&store, handler.clone(), config(8)));
    let shutdown = CancellationToken::new();

    // Act
    let task = relay.spawn(shutdown.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();

    // Assert
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handler.delivered().len(), 6);
}

/// Fails every delivery, but only after another relay has taken over the
/// entry because this relay's lease expired mid-delivery.
struct OvertakenHandler {
    store: InMemoryEventStore,
}

#[async_trait]
impl MessageHandler for OvertakenHandler {
    async fn handle(&self, _entry: &OutboxEntry) -> Result<(), DomainError> {
        let later = chrono::Utc::now() + chrono::Duration::hours(1);
        self.store
            .claim_pending(10, later, chrono::Duration::seconds(30))
            .await?;
        Err(DomainError::Infrastructure("handler down".into()))
    }
}

#[tokio::test]
async fn test_relay_with_expired_lease_leaves_reclaimed_entry_alone() {
    // Arrange
    let store = store();
    enqueue(&store, "a", 1).await;
    let relay = OutboxRelay::new(
        Arc::new(store.clone()),
        HandlerRegistry::new().with_handler(
            INBOX,
            Arc::new(OvertakenHandler {
                store: store.clone(),
            }),
        ),
        config(8),
    )
    .with_retry(RetryPolicy::never());

    // Act
    let report = relay.run_once().await.unwrap();

    // Assert
    assert_eq!(report.claimed, 1);
    assert_eq!(report.released, 0);
    let entry = &store.outbox_entries()[0];
    assert_eq!(entry.status, OutboxStatus::Dispatching);
    assert_eq!(entry.attempts, 2);
    assert!(entry.last_error.is_none());
}
