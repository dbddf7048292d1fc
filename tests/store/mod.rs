use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use esrs_gateway::codec::EventCodec;
use esrs_gateway::store::{EventRecord, EventStore, EventStoreError, InMemoryEventStore};
use esrs_gateway::AnyEvent;

use crate::aggregate::*;

fn store() -> InMemoryEventStore {
    InMemoryEventStore::new(registry().codec())
}

#[tokio::test]
async fn unknown_aggregate_id_has_empty_history() {
    let store = store();

    assert!(store.by_aggregate_id("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn persisted_events_keep_their_type_and_fields() {
    let store = store();
    let named = FooNamed {
        id: "F1".to_string(),
        name: "ünïcødé \"quoted\" name".to_string(),
    };

    store
        .persist(
            "F1",
            vec![FooCreated { id: "F1".to_string() }.into(), named.clone().into()],
            0,
        )
        .await
        .unwrap();

    let events = store.by_aggregate_id("F1").await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].payload.is::<FooCreated>());
    assert_eq!(events[1].payload.downcast_ref::<FooNamed>(), Some(&named));
    assert_eq!(events[1].payload.name(), "FooNamed");
    assert_eq!(events[1].sequence_number(), 2);
    assert_eq!(events[0].occurred_on, events[1].occurred_on);
    assert_ne!(events[0].id, events[1].id);
}

#[tokio::test]
async fn persist_returns_the_stored_events() {
    let store = store();

    let persisted = store
        .persist("B1", vec![BarCreated { id: "B1".to_string() }.into()], 0)
        .await
        .unwrap();

    let loaded = store.by_aggregate_id("B1").await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].id, loaded[0].id);
    assert_eq!(persisted[0].aggregate_id, "B1");
    assert_eq!(persisted[0].sequence_number, 1);
}

#[tokio::test]
async fn stale_sequence_number_is_refused() {
    let store = store();

    store
        .persist("B1", vec![BarCreated { id: "B1".to_string() }.into()], 0)
        .await
        .unwrap();

    let error = store
        .persist(
            "B1",
            vec![BarConfigured {
                id: "B1".to_string(),
                configuration: "cfg".to_string(),
            }
            .into()],
            0,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        EventStoreError::SequenceConflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert_eq!(store.records("B1").await.len(), 1);
}

#[tokio::test]
async fn batch_with_an_unknown_event_is_not_persisted() {
    // A codec that only knows foos.
    let mut codec = EventCodec::new();
    codec.register::<FooCreated>().unwrap();
    let store = InMemoryEventStore::new(codec);

    let events: Vec<AnyEvent> = vec![
        FooCreated { id: "F1".to_string() }.into(),
        BarCreated { id: "F1".to_string() }.into(),
    ];

    let error = store.persist("F1", events, 0).await.unwrap_err();

    assert!(matches!(error, EventStoreError::UnknownEventType { name } if name == "BarCreated"));
    assert!(store.records("F1").await.is_empty());
    assert!(store.stream_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn stream_follows_global_append_order() {
    let store = store();

    store
        .persist("F1", vec![FooCreated { id: "F1".to_string() }.into()], 0)
        .await
        .unwrap();
    store
        .persist("B1", vec![BarCreated { id: "B1".to_string() }.into()], 0)
        .await
        .unwrap();
    store
        .persist(
            "F1",
            vec![FooNamed {
                id: "F1".to_string(),
                name: "n".to_string(),
            }
            .into()],
            1,
        )
        .await
        .unwrap();

    let names: Vec<&str> = store
        .stream_events()
        .await
        .unwrap()
        .iter()
        .map(|event| event.payload.name())
        .collect();

    assert_eq!(names, vec!["FooCreated", "BarCreated", "FooNamed"]);
}

#[test]
fn records_with_unknown_tags_or_bad_payloads_fail_to_decode() {
    let codec = registry().codec();

    let record = EventRecord {
        id: Uuid::new_v4(),
        aggregate_id: "F1".to_string(),
        event_type: "FooDeleted".to_string(),
        payload: json!({ "id": "F1" }),
        occurred_on: Utc::now(),
        sequence_number: 1,
    };

    assert!(matches!(
        record.clone().try_into_store_event(&codec),
        Err(EventStoreError::UnknownEventType { .. })
    ));

    let malformed = EventRecord {
        event_type: "FooNamed".to_string(),
        payload: json!({ "id": "F1" }),
        ..record
    };

    assert!(matches!(
        malformed.try_into_store_event(&codec),
        Err(EventStoreError::Json(_))
    ));
}

#[tokio::test]
async fn lock_is_released_on_drop() {
    let store = store();

    let guard = store.lock("F1").await.unwrap();
    let other = store.lock("F2").await.unwrap();
    drop(guard);

    let again = tokio::time::timeout(std::time::Duration::from_secs(1), store.lock("F1")).await;
    assert!(again.is_ok());
    drop(other);
}
