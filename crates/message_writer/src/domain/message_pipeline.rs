use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, instrument, trace, warn};

use super::{DomainError, Envelope, Observation, ObservationSession, ObservationStore};

/// State the pipeline was in when it aborted on a decode failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    EnvelopeDecoded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => f.write_str("received"),
            Stage::EnvelopeDecoded => f.write_str("envelope_decoded"),
        }
    }
}

/// Progress of a single message through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Received,
    EnvelopeDecoded,
    SeriesDecoded,
    Normalized,
    /// Writing the record at this index
    Writing(usize),
    Done,
    /// Nothing was written
    Aborted(Stage),
    /// Stopped at this record index; earlier records stay written
    Failed(usize),
}

impl MessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageState::Done | MessageState::Aborted(_) | MessageState::Failed(_)
        )
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageState::Received => f.write_str("received"),
            MessageState::EnvelopeDecoded => f.write_str("envelope_decoded"),
            MessageState::SeriesDecoded => f.write_str("series_decoded"),
            MessageState::Normalized => f.write_str("normalized"),
            MessageState::Writing(index) => write!(f, "writing({index})"),
            MessageState::Done => f.write_str("done"),
            MessageState::Aborted(stage) => write!(f, "aborted({stage})"),
            MessageState::Failed(index) => write!(f, "failed({index})"),
        }
    }
}

/// Result of processing one message
#[derive(Debug)]
pub struct MessageOutcome {
    pub state: MessageState,
    /// Observations persisted before the pipeline stopped
    pub written: usize,
    pub error: Option<DomainError>,
}

impl MessageOutcome {
    fn done(written: usize) -> Self {
        Self {
            state: MessageState::Done,
            written,
            error: None,
        }
    }

    fn aborted(stage: Stage, error: DomainError) -> Self {
        Self {
            state: MessageState::Aborted(stage),
            written: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Turns one bus message into stored observations:
/// envelope decode, SenML decode, resolution, then per-record map and insert.
pub struct MessagePipeline {
    store: Arc<dyn ObservationStore>,
}

impl MessagePipeline {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    pub async fn process(&self, payload: &[u8]) -> MessageOutcome {
        self.process_at(payload, Utc::now()).await
    }

    /// Process a message as if it arrived at `captured_at`. The capture time
    /// anchors relative SenML times and stamps every observation.
    pub async fn process_at(&self, payload: &[u8], captured_at: DateTime<Utc>) -> MessageOutcome {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(stage = %Stage::Received, kind = e.kind(), error = %e, "failed to decode envelope");
                return MessageOutcome::aborted(Stage::Received, e);
            }
        };

        if envelope.is_empty() {
            debug!("empty message, nothing to write");
            return MessageOutcome::done(0);
        }

        let raw = match senml::decode(&envelope.payload) {
            Ok(records) => records,
            Err(e) => {
                let e = DomainError::from(e);
                error!(
                    channel = %envelope.channel,
                    publisher = %envelope.publisher,
                    stage = %Stage::EnvelopeDecoded,
                    kind = e.kind(),
                    error = %e,
                    "failed to decode measurement pack"
                );
                return MessageOutcome::aborted(Stage::EnvelopeDecoded, e);
            }
        };

        let now = captured_at.timestamp_micros() as f64 / 1_000_000.0;
        let records = senml::normalize_at(&raw, now);
        if records.is_empty() {
            debug!(channel = %envelope.channel, "measurement pack has no records");
            return MessageOutcome::done(0);
        }

        let mut session = match self.store.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(
                    channel = %envelope.channel,
                    publisher = %envelope.publisher,
                    stage = %MessageState::Normalized,
                    kind = e.kind(),
                    error = %e,
                    "failed to open observation session"
                );
                return MessageOutcome {
                    state: MessageState::Failed(0),
                    written: 0,
                    error: Some(e),
                };
            }
        };

        let timestamp = captured_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let outcome = write_records(session.as_mut(), &envelope, &records, &timestamp).await;

        if let Err(e) = session.close().await {
            warn!(channel = %envelope.channel, error = %e, "failed to close observation session");
        }

        match &outcome.error {
            Some(e) => error!(
                channel = %envelope.channel,
                publisher = %envelope.publisher,
                stage = %outcome.state,
                written = outcome.written,
                kind = e.kind(),
                error = %e,
                "failed to store observations"
            ),
            None => debug!(
                channel = %envelope.channel,
                publisher = %envelope.publisher,
                written = outcome.written,
                "stored observations"
            ),
        }

        outcome
    }
}

/// Map and insert in source order, stopping at the first failure
async fn write_records(
    session: &mut dyn ObservationSession,
    envelope: &Envelope,
    records: &[senml::Record],
    timestamp: &str,
) -> MessageOutcome {
    for (index, record) in records.iter().enumerate() {
        trace!(state = %MessageState::Writing(index), "writing observation");
        let result = match Observation::from_record(index, record, envelope, timestamp) {
            Ok(observation) => session
                .insert(&observation)
                .await
                .map_err(|e| e.into_persistence(index)),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            return MessageOutcome {
                state: MessageState::Failed(index),
                written: index,
                error: Some(e),
            };
        }
    }

    MessageOutcome::done(records.len())
}
