//! End-to-end tests for ingestion, the dispatcher, and the processor,
//! running against the in-memory stores.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::time::Duration;

use rockets_core::dispatcher::{Dispatcher, DispatcherConfig};
use rockets_core::processor::EventProcessor;
use rockets_core::service::RocketService;
use rockets_db::{EventRecordStore, InMemoryStore, RocketStore};
use rockets_types::{EventRecordId, EventStatus, Rocket, RocketId, RocketStatus};
use serde_json::{Value, json};

// =============================================================================
// Helpers
// =============================================================================

struct Engine {
    store: InMemoryStore,
    service: RocketService,
    dispatcher: Dispatcher,
}

impl Engine {
    fn new(config: DispatcherConfig) -> Self {
        let store = InMemoryStore::new();
        let events: Arc<dyn EventRecordStore> = Arc::new(store.clone());
        let rockets: Arc<dyn RocketStore> = Arc::new(store.clone());
        Self {
            service: RocketService::new(Arc::clone(&events), Arc::clone(&rockets)),
            dispatcher: Dispatcher::new(events, rockets, config)
                .expect("invalid dispatcher config"),
            store,
        }
    }

    fn fast() -> Self {
        Self::new(DispatcherConfig {
            poll_interval: Duration::from_millis(5),
            ..DispatcherConfig::default()
        })
    }

    async fn ingest(&self, rocket: &str, seq: i64, tag: &str, payload: Value) -> EventRecordId {
        self.service
            .ingest(RocketId::from(rocket), seq, tag, &payload)
            .await
            .expect("ingest failed")
    }

    /// Wait until no record is pending or processing.
    async fn drain(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let busy = self
                    .store
                    .events()
                    .await
                    .iter()
                    .any(|r| !r.status.is_terminal());
                if !busy {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("records were not drained in time");
    }

    async fn rocket(&self, id: &str) -> Rocket {
        self.service
            .get_rocket(&RocketId::from(id))
            .await
            .expect("rocket missing")
    }

    async fn status(&self, id: EventRecordId) -> EventStatus {
        self.service.get_event(id).await.unwrap().status
    }
}

const ROCKET: &str = "193270a9-c9cf-404a-8f83-838e71d9ae67";

fn launch() -> Value {
    json!({"type": "Falcon-9", "launchSpeed": 500, "mission": "ARTEMIS"})
}

// =============================================================================
// Lifecycle scenarios
// =============================================================================

#[tokio::test]
async fn launch_accelerate_stale_explode_unknown() {
    let engine = Engine::fast();
    engine.dispatcher.start().await;

    // Launch then accelerate.
    let launched = engine.ingest(ROCKET, 1, "RocketLaunched", launch()).await;
    engine.drain().await;
    engine
        .ingest(ROCKET, 2, "RocketSpeedIncreased", json!({"by": 300}))
        .await;
    engine.drain().await;

    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.current_speed, 800);
    assert_eq!(rocket.status, RocketStatus::Active);
    assert_eq!(rocket.kind, "Falcon-9");
    assert_eq!(rocket.mission, "ARTEMIS");
    assert_eq!(rocket.last_applied_sequence, 2);

    // A stale redelivery at an applied sequence changes nothing.
    let stale = engine
        .ingest(ROCKET, 1, "RocketSpeedIncreased", json!({"by": 500}))
        .await;
    assert_eq!(stale, launched);
    engine.drain().await;
    assert_eq!(engine.status(stale).await, EventStatus::Processed);
    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.current_speed, 800);
    assert_eq!(rocket.last_applied_sequence, 2);

    // Explosion resets speed.
    engine
        .ingest(ROCKET, 3, "RocketExploded", json!({"reason": "engine malfunction"}))
        .await;
    engine.drain().await;
    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.status, RocketStatus::Exploded);
    assert_eq!(rocket.current_speed, 0);
    assert_eq!(rocket.explosion_reason.as_deref(), Some("engine malfunction"));
    assert_eq!(rocket.last_applied_sequence, 3);

    // Unknown type fails the record and leaves the rocket alone.
    let unknown = engine
        .ingest(ROCKET, 4, "RocketTeleported", json!({"to": "moon"}))
        .await;
    engine.drain().await;
    let record = engine.service.get_event(unknown).await.unwrap();
    assert_eq!(record.status, EventStatus::Failed);
    assert!(!record.error_message.unwrap_or_default().is_empty());
    assert!(record.processed_at.is_some());
    assert_eq!(engine.rocket(ROCKET).await, rocket);

    assert!(engine.dispatcher.stop().await);
}

#[tokio::test]
async fn out_of_order_arrival_skips_the_late_event() {
    let engine = Engine::fast();
    engine.ingest(ROCKET, 1, "RocketLaunched", launch()).await;
    engine
        .ingest(ROCKET, 3, "RocketSpeedIncreased", json!({"by": 100}))
        .await;

    engine.dispatcher.start().await;
    engine.drain().await;

    let late = engine
        .ingest(ROCKET, 2, "RocketSpeedDecreased", json!({"by": 200}))
        .await;
    engine.drain().await;
    engine.dispatcher.stop().await;

    assert_eq!(engine.status(late).await, EventStatus::Processed);
    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.current_speed, 600);
    assert_eq!(rocket.last_applied_sequence, 3);
}

#[tokio::test]
async fn speed_floor_holds_through_the_pipeline() {
    let engine = Engine::fast();
    engine.dispatcher.start().await;
    engine.ingest(ROCKET, 1, "RocketLaunched", launch()).await;
    engine.drain().await;
    for seq in 2..=6 {
        engine
            .ingest(ROCKET, seq, "RocketSpeedDecreased", json!({"by": 250}))
            .await;
        engine.drain().await;
        assert!(engine.rocket(ROCKET).await.current_speed >= 0);
    }
    engine.dispatcher.stop().await;

    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.current_speed, 0);
    assert_eq!(rocket.last_applied_sequence, 6);
}

// =============================================================================
// Determinism and concurrency
// =============================================================================

fn stream() -> Vec<(i64, &'static str, Value)> {
    vec![
        (1, "RocketLaunched", launch()),
        (2, "RocketSpeedIncreased", json!({"by": 300})),
        (3, "RocketMissionChanged", json!({"newMission": "SHUTTLE_MIR"})),
        (4, "RocketSpeedDecreased", json!({"by": 1000})),
        (5, "RocketSpeedIncreased", json!({"by": 42})),
    ]
}

/// Kind, speed, mission, status, reason, and sequence: everything except
/// the timestamps.
fn essence(rocket: &Rocket) -> (String, i64, String, RocketStatus, Option<String>, i64) {
    (
        rocket.kind.clone(),
        rocket.current_speed,
        rocket.mission.clone(),
        rocket.status,
        rocket.explosion_reason.clone(),
        rocket.last_applied_sequence,
    )
}

#[tokio::test]
async fn same_events_in_sequence_order_give_same_state() {
    let arrival_orders: [&[usize]; 4] = [
        &[0, 1, 2, 3, 4],
        &[4, 3, 2, 1, 0],
        &[2, 0, 2, 4, 1, 3, 0],
        &[1, 1, 1, 0, 4, 3, 2, 4],
    ];

    let mut outcomes = Vec::new();
    for order in arrival_orders {
        let store = InMemoryStore::new();
        let service = RocketService::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let processor = EventProcessor::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let events = stream();

        for &index in order {
            let (seq, tag, payload) = &events[index];
            service
                .ingest(RocketId::from(ROCKET), *seq, tag, payload)
                .await
                .unwrap();
        }

        // Duplicates collapse into one record per sequence number.
        assert_eq!(store.events().await.len(), 5);

        let mut claimed = store.claim_pending_batch(100).await.unwrap();
        claimed.sort_by_key(|r| r.sequence_number);
        for record in &claimed {
            processor.process(record).await.unwrap();
        }
        outcomes.push(essence(&store.get(&RocketId::from(ROCKET)).await.unwrap().unwrap()));
    }

    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(
        outcomes[0],
        ("Falcon-9".to_owned(), 42, "SHUTTLE_MIR".to_owned(), RocketStatus::Active, None, 5)
    );
}

#[tokio::test]
async fn many_workers_drain_many_rockets() {
    let engine = Engine::new(DispatcherConfig {
        poll_interval: Duration::from_millis(2),
        batch_size: 3,
        worker_count: 4,
        reclaim_after: Duration::from_secs(300),
    });

    let rockets: Vec<String> = (0..5).map(|n| format!("rocket-{n}")).collect();
    for rocket in &rockets {
        engine.ingest(rocket, 1, "RocketLaunched", launch()).await;
    }
    engine.dispatcher.start().await;
    for seq in 2..=12 {
        for rocket in &rockets {
            engine
                .ingest(rocket, seq, "RocketSpeedIncreased", json!({"by": 1}))
                .await;
        }
    }
    engine.drain().await;
    engine.dispatcher.stop().await;

    let records = engine.store.events().await;
    assert_eq!(records.len(), 60);
    assert!(records.iter().all(|r| r.status == EventStatus::Processed));

    for rocket in &rockets {
        let state = engine.rocket(rocket).await;
        assert_eq!(state.last_applied_sequence, 12);
        assert!(state.current_speed <= 511);
    }

    let listed = engine.service.list_rockets(None).await.unwrap();
    assert_eq!(listed.len(), 5);
}

#[tokio::test]
async fn concurrent_upserts_never_lower_the_sequence() {
    let store = InMemoryStore::new();
    // 50, 1, 49, 2, 48, 3, ...
    let writers = (0..50).map(|i: i64| {
        let store = store.clone();
        let seq = if i % 2 == 0 { 50 - i / 2 } else { 1 + i / 2 };
        tokio::spawn(async move {
            let mut rocket = Rocket::new(RocketId::from(ROCKET), chrono::Utc::now());
            rocket.last_applied_sequence = seq;
            rocket.current_speed = seq;
            store.conditional_upsert(&rocket).await.unwrap();
            store.get(&RocketId::from(ROCKET)).await.unwrap().unwrap().last_applied_sequence
        })
    });

    let observed = futures::future::join_all(writers).await;
    for seen in observed {
        assert!(seen.unwrap() >= 1);
    }
    let stored = store.get(&RocketId::from(ROCKET)).await.unwrap().unwrap();
    assert_eq!(stored.last_applied_sequence, 50);
    assert_eq!(stored.current_speed, 50);
}

// =============================================================================
// Failure recovery and shutdown
// =============================================================================

#[tokio::test]
async fn transient_store_error_is_recovered_by_reclaim() {
    let engine = Engine::new(DispatcherConfig {
        poll_interval: Duration::from_millis(5),
        batch_size: 10,
        worker_count: 1,
        reclaim_after: Duration::ZERO,
    });
    engine.store.fail_next_upserts(1).await;

    let first = engine.ingest(ROCKET, 1, "RocketLaunched", launch()).await;
    let second = engine
        .ingest(ROCKET, 2, "RocketSpeedIncreased", json!({"by": 300}))
        .await;

    engine.dispatcher.start().await;
    engine.drain().await;
    engine.dispatcher.stop().await;

    assert_eq!(engine.status(first).await, EventStatus::Processed);
    assert_eq!(engine.status(second).await, EventStatus::Processed);

    // The launch failed transiently, so the increase applied to a fresh
    // rocket; the reclaimed launch then found sequence 1 already covered.
    let rocket = engine.rocket(ROCKET).await;
    assert_eq!(rocket.last_applied_sequence, 2);
}

#[tokio::test]
async fn stopped_dispatcher_leaves_new_events_pending() {
    let engine = Engine::fast();
    assert!(engine.dispatcher.start().await);
    assert!(!engine.dispatcher.start().await);
    assert!(engine.dispatcher.stop().await);
    assert!(!engine.dispatcher.stop().await);

    let id = engine.ingest(ROCKET, 1, "RocketLaunched", launch()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.status(id).await, EventStatus::Pending);

    engine.dispatcher.start().await;
    engine.drain().await;
    engine.dispatcher.stop().await;
    assert_eq!(engine.status(id).await, EventStatus::Processed);
}
