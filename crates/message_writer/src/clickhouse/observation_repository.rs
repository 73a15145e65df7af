use crate::domain::{DomainError, DomainResult, Observation, ObservationSession, ObservationStore};
use async_trait::async_trait;
use clickhouse::Row;
use common::clickhouse::ClickHouseClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct ObservationRow {
    pub channel: String,
    pub publisher: String,
    pub protocol: String,
    pub content_type: String,
    pub name: String,
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub bool_value: Option<bool>,
    pub data_value: Option<String>,
    pub value_sum: Option<f64>,
    pub time: Option<f64>,
    pub update_time: Option<f64>,
    pub link: Option<String>,
    pub timestamp: String,
}

impl From<&Observation> for ObservationRow {
    fn from(observation: &Observation) -> Self {
        ObservationRow {
            channel: observation.channel.clone(),
            publisher: observation.publisher.clone(),
            protocol: observation.protocol.clone(),
            content_type: observation.content_type.clone(),
            name: observation.name.clone(),
            unit: observation.unit.clone(),
            value: observation.value,
            string_value: observation.string_value.clone(),
            bool_value: observation.bool_value,
            data_value: observation.data_value.clone(),
            value_sum: observation.value_sum,
            time: observation.time,
            update_time: observation.update_time,
            link: observation.link.clone(),
            timestamp: observation.timestamp.clone(),
        }
    }
}

/// ClickHouse implementation of ObservationStore
#[derive(Clone)]
pub struct ClickHouseObservationRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseObservationRepository {
    pub fn new(client: ClickHouseClient, table: String) -> Self {
        Self { client, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the observation table when it does not exist yet
    pub async fn ensure_table(&self) -> DomainResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                channel String,
                publisher String,
                protocol String,
                content_type String,
                name String,
                unit Nullable(String),
                value Nullable(Float64),
                string_value Nullable(String),
                bool_value Nullable(Bool),
                data_value Nullable(String),
                value_sum Nullable(Float64),
                time Nullable(Float64),
                update_time Nullable(Float64),
                link Nullable(String),
                timestamp String
            ) ENGINE = MergeTree ORDER BY (channel, timestamp)",
            self.table
        );

        self.client
            .get_client()
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| {
                error!(table = %self.table, "failed to create observation table: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        info!(table = %self.table, "observation table ready");
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for ClickHouseObservationRepository {
    async fn open_session(&self) -> DomainResult<Box<dyn ObservationSession>> {
        Ok(Box::new(ClickHouseObservationSession {
            client: self.client.clone(),
            table: self.table.clone(),
            inserted: 0,
        }))
    }
}

/// Session over a clone of the shared HTTP client. Every insert is its own
/// ClickHouse INSERT, so rows already written survive a later failure.
pub struct ClickHouseObservationSession {
    client: ClickHouseClient,
    table: String,
    inserted: usize,
}

#[async_trait]
impl ObservationSession for ClickHouseObservationSession {
    async fn insert(&mut self, observation: &Observation) -> DomainResult<()> {
        let row = ObservationRow::from(observation);

        let mut insert = self
            .client
            .get_client()
            .insert::<ObservationRow>(&self.table)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        insert
            .write(&row)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        insert
            .end()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        self.inserted += 1;
        Ok(())
    }

    async fn close(&mut self) -> DomainResult<()> {
        debug!(
            table = %self.table,
            rows_inserted = self.inserted,
            "closing observation session"
        );
        Ok(())
    }
}
