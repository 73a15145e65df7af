use async_trait::async_trait;
use message_writer::domain::{
    DomainError, DomainResult, MessagePipeline, MessageState, Observation, ObservationSession,
    ObservationStore,
};
use std::sync::{Arc, Mutex};

/// Store keeping every inserted observation in memory, optionally failing
/// the insert whose position (counted per session) matches `fail_at`.
#[derive(Default)]
struct InMemoryStore {
    rows: Arc<Mutex<Vec<Observation>>>,
    sessions: Arc<Mutex<SessionCounts>>,
    fail_at: Option<usize>,
}

#[derive(Default)]
struct SessionCounts {
    opened: usize,
    closed: usize,
}

struct InMemorySession {
    rows: Arc<Mutex<Vec<Observation>>>,
    sessions: Arc<Mutex<SessionCounts>>,
    fail_at: Option<usize>,
    attempts: usize,
}

#[async_trait]
impl ObservationStore for InMemoryStore {
    async fn open_session(&self) -> DomainResult<Box<dyn ObservationSession>> {
        self.sessions.lock().unwrap().opened += 1;
        Ok(Box::new(InMemorySession {
            rows: self.rows.clone(),
            sessions: self.sessions.clone(),
            fail_at: self.fail_at,
            attempts: 0,
        }))
    }
}

#[async_trait]
impl ObservationSession for InMemorySession {
    async fn insert(&mut self, observation: &Observation) -> DomainResult<()> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.fail_at == Some(attempt) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "table is read only"
            )));
        }
        self.rows.lock().unwrap().push(observation.clone());
        Ok(())
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.sessions.lock().unwrap().closed += 1;
        Ok(())
    }
}

fn message(channel: &str, publisher: &str, pack: serde_json::Value) -> Vec<u8> {
    serde_json::json!({
        "channel": channel,
        "publisher": publisher,
        "protocol": "mqtt",
        "content_type": "json",
        "payload": pack.to_string(),
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_empty_message_opens_no_session() {
    let store = Arc::new(InMemoryStore::default());
    let pipeline = MessagePipeline::new(store.clone());

    let outcome = pipeline.process(b"").await;

    assert_eq!(outcome.state, MessageState::Done);
    assert!(outcome.error.is_none());
    assert_eq!(store.sessions.lock().unwrap().opened, 0);
    assert!(store.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_two_record_message_yields_two_rows_with_shared_timestamp() {
    let store = Arc::new(InMemoryStore::default());
    let pipeline = MessagePipeline::new(store.clone());

    let outcome = pipeline
        .process(&message(
            "c1",
            "p1",
            serde_json::json!([
                {"bn": "room/", "n": "temp", "u": "Cel", "v": 21.5, "t": 1.7e9},
                {"n": "hum", "u": "%RH", "v": 40, "t": 1.7e9}
            ]),
        ))
        .await;

    assert_eq!(outcome.state, MessageState::Done);
    assert_eq!(outcome.written, 2);

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|row| row.channel == "c1" && row.publisher == "p1" && row.protocol == "mqtt"));
    assert_eq!(rows[0].timestamp, rows[1].timestamp);
    assert_eq!(rows[0].name, "room/temp");
    assert_eq!(rows[1].name, "room/hum");
}

#[tokio::test]
async fn test_failure_on_second_of_three_keeps_first_row() {
    let store = Arc::new(InMemoryStore {
        fail_at: Some(1),
        ..Default::default()
    });
    let pipeline = MessagePipeline::new(store.clone());

    let outcome = pipeline
        .process(&message(
            "c1",
            "p1",
            serde_json::json!([{"n": "a", "v": 1}, {"n": "b", "v": 2}, {"n": "c", "v": 3}]),
        ))
        .await;

    assert_eq!(outcome.state, MessageState::Failed(1));
    assert_eq!(outcome.written, 1);
    assert!(matches!(
        outcome.error,
        Some(DomainError::PersistenceError { index: 1, .. })
    ));

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "a");

    let sessions = store.sessions.lock().unwrap();
    assert_eq!(sessions.opened, 1);
    assert_eq!(sessions.closed, 1);
}

#[tokio::test]
async fn test_sum_chain_resolves_through_pipeline() {
    let store = Arc::new(InMemoryStore::default());
    let pipeline = MessagePipeline::new(store.clone());

    pipeline
        .process(&message(
            "c1",
            "p1",
            serde_json::json!([
                {"n": "energy", "v": 100, "t": 1.7e9},
                {"n": "energy", "s": 5, "t": 1.7e9},
                {"n": "energy", "s": 7, "t": 1.7e9}
            ]),
        ))
        .await;

    let values: Vec<Option<f64>> = store.rows.lock().unwrap().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![Some(100.0), Some(105.0), Some(112.0)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_do_not_mix_metadata() {
    let store = Arc::new(InMemoryStore::default());
    let pipeline = Arc::new(MessagePipeline::new(store.clone()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let channel = format!("ch-{i}");
            let publisher = format!("pub-{i}");
            let payload = message(
                &channel,
                &publisher,
                serde_json::json!([
                    {"bn": format!("{channel}/"), "n": "a", "v": i},
                    {"n": "b", "v": i}
                ]),
            );
            pipeline.process(&payload).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, MessageState::Done);
        assert_eq!(outcome.written, 2);
    }

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 32);
    for row in rows.iter() {
        let suffix = row.channel.trim_start_matches("ch-");
        assert_eq!(row.publisher, format!("pub-{suffix}"));
        assert!(row.name.starts_with(&format!("{}/", row.channel)));
        assert_eq!(row.value, Some(suffix.parse::<f64>().unwrap()));
    }

    let sessions = store.sessions.lock().unwrap();
    assert_eq!(sessions.opened, 16);
    assert_eq!(sessions.closed, 16);
}
