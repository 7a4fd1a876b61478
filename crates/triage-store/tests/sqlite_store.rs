//! SqliteStore integration tests against file-backed and in-memory databases

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use triage_core::{
    Confidence, Error, FeatureSchema, FeatureValue, FeatureVector, FeatureVectorBuilder, FieldSpec,
    TriageLevel,
};
use triage_store::{RecordStore, SqliteStore, StoreConfig};

fn schema() -> Arc<FeatureSchema> {
    Arc::new(FeatureSchema::triage_default())
}

fn vector(schema: &Arc<FeatureSchema>, pain: i64) -> FeatureVector {
    FeatureVectorBuilder::new(schema.clone())
        .build(&json!({
            "gender": "female",
            "age": 45,
            "chief_complaint": "chest pain",
            "pain_grade": pain,
            "blood_pressure_systolic": 160,
            "blood_pressure_diastolic": 100,
            "pulse_rate": 110,
            "respiratory_rate": 22,
            "o2_saturation": 91
        }))
        .unwrap()
}

fn file_store(dir: &tempfile::TempDir, config: StoreConfig) -> SqliteStore {
    let config = config.with_path(dir.path().join("triage.db"));
    SqliteStore::open(&config, schema()).unwrap()
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir, StoreConfig::default());
    store.ensure_schema().await.unwrap();

    let schema = store.layout().schema().clone();
    let confidence = Confidence::from_probabilities(&[0.3, 0.7]).unwrap();
    let record = store
        .insert_and_fetch(&vector(&schema, 8), TriageLevel::Urgent, Some(confidence))
        .await
        .unwrap();

    assert!(record.id > 0);
    assert_eq!(record.features.get("pain_grade"), Some(&FeatureValue::Integer(8)));
    assert_eq!(
        record.features.get("chief_complaint"),
        Some(&FeatureValue::Categorical("chest pain".into()))
    );

    // Readers see the committed row.
    let fetched = store.fetch(record.id).await.unwrap();
    assert_eq!(fetched, Some(record.clone()));
    assert_eq!(store.list_recent(None).await.unwrap(), vec![record]);
}

#[tokio::test]
async fn test_reopen_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = file_store(&dir, StoreConfig::default());
        store.ensure_schema().await.unwrap();
        let schema = store.layout().schema().clone();
        store
            .insert_and_fetch(&vector(&schema, 2), TriageLevel::NotUrgent, None)
            .await
            .unwrap();
    }

    let store = file_store(&dir, StoreConfig::default());
    store.ensure_schema().await.unwrap();
    let counts = store.aggregate_counts().await.unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.count(TriageLevel::NotUrgent), 1);
}

#[tokio::test]
async fn test_fetch_missing_id() {
    let store = SqliteStore::open_in_memory(schema()).unwrap();
    store.ensure_schema().await.unwrap();
    assert_eq!(store.fetch(42).await.unwrap(), None);
}

#[tokio::test]
async fn test_schema_drift_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triage.db");
    {
        let conn = rusqlite_open(&path);
        conn.execute_batch(
            "CREATE TABLE patient_records (id INTEGER PRIMARY KEY, gender TEXT, age INTEGER)",
        )
        .unwrap();
    }

    let store = SqliteStore::open(&StoreConfig::default().with_path(&path), schema()).unwrap();
    match store.ensure_schema().await {
        Err(Error::ConstraintViolation(msg)) => assert!(msg.contains("no column"), "{msg}"),
        other => panic!("expected ConstraintViolation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_vector_from_other_schema_is_refused() {
    let store = SqliteStore::open_in_memory(schema()).unwrap();
    store.ensure_schema().await.unwrap();

    let other = Arc::new(FeatureSchema::new(vec![FieldSpec::integer("age")]).unwrap());
    let vector = FeatureVectorBuilder::new(other).build(&json!([40])).unwrap();
    let err = store
        .insert_and_fetch(&vector, TriageLevel::Urgent, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation(_)));
    assert_eq!(store.aggregate_counts().await.unwrap().total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir, StoreConfig::default());
    store.ensure_schema().await.unwrap();
    let schema = store.layout().schema().clone();

    let tasks = (0..50).map(|i| {
        let store = store.clone();
        let vector = vector(&schema, i % 11);
        let level = if i % 2 == 0 {
            TriageLevel::Urgent
        } else {
            TriageLevel::NotUrgent
        };
        tokio::spawn(async move { store.insert_and_fetch(&vector, level, None).await })
    });

    let ids: HashSet<i64> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();
    assert_eq!(ids.len(), 50);

    let counts = store.aggregate_counts().await.unwrap();
    assert_eq!(counts.total, 50);
    assert_eq!(counts.count(TriageLevel::Urgent), 25);
    assert_eq!(counts.count(TriageLevel::NotUrgent), 25);
    assert_eq!(store.list_recent(Some(0)).await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_locked_database_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        busy_timeout_ms: 50,
        ..StoreConfig::default()
    };
    let store = file_store(&dir, config);
    store.ensure_schema().await.unwrap();
    let schema = store.layout().schema().clone();

    let holder = rusqlite_open(&dir.path().join("triage.db"));
    holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let err = store
        .insert_and_fetch(&vector(&schema, 5), TriageLevel::Urgent, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)), "{err:?}");
    assert!(err.is_retryable());

    holder.execute_batch("ROLLBACK").unwrap();
    assert_eq!(store.aggregate_counts().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_operation_timeout_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        busy_timeout_ms: 2000,
        operation_timeout_ms: 100,
        ..StoreConfig::default()
    };
    let store = file_store(&dir, config);
    store.ensure_schema().await.unwrap();
    let schema = store.layout().schema().clone();

    let holder = rusqlite_open(&dir.path().join("triage.db"));
    holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

    // The first insert waits on the database lock, the second on the writer.
    let (vector_5, vector_6) = (vector(&schema, 5), vector(&schema, 6));
    let (first, second) = tokio::join!(
        store.insert_and_fetch(&vector_5, TriageLevel::Urgent, None),
        store.insert_and_fetch(&vector_6, TriageLevel::Urgent, None),
    );
    for result in [first, second] {
        match result {
            Err(Error::StoreUnavailable(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
    }

    // Once the lock is gone, neither abandoned insert may land.
    holder.execute_batch("ROLLBACK").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.aggregate_counts().await.unwrap().total, 0);

    let record = store
        .insert_and_fetch(&vector(&schema, 7), TriageLevel::Urgent, None)
        .await
        .unwrap();
    assert_eq!(record.features.get("pain_grade"), Some(&FeatureValue::Integer(7)));
    assert_eq!(store.aggregate_counts().await.unwrap().total, 1);
}

fn rusqlite_open(path: &std::path::Path) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}

#[tokio::test]
async fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/data/triage.db");
    let store = SqliteStore::open(&StoreConfig::default().with_path(&path), schema()).unwrap();
    store.ensure_schema().await.unwrap();
    assert!(path.exists());
}
