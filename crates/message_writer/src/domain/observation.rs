use senml::Record;
use serde::Serialize;

use super::{DomainError, DomainResult, Envelope};

/// One resolved record together with the delivery metadata of the message
/// it came from. This is the unit written to storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
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
    /// RFC3339 processing time shared by every observation of a message
    pub timestamp: String,
}

impl Observation {
    /// Map the resolved record at `index` onto an observation.
    ///
    /// Fails only when a numeric field is NaN or infinite, which resolution
    /// can produce from extreme base and sum values.
    pub fn from_record(
        index: usize,
        record: &Record,
        envelope: &Envelope,
        timestamp: &str,
    ) -> DomainResult<Self> {
        let numeric = [
            ("value", record.value),
            ("value_sum", record.sum),
            ("time", record.time),
            ("update_time", record.update_time),
        ];
        if let Some((field, _)) = numeric
            .iter()
            .find(|(_, number)| number.is_some_and(|n| !n.is_finite()))
        {
            return Err(DomainError::MappingError {
                index,
                reason: format!("{field} is not a finite number"),
            });
        }

        Ok(Self {
            channel: envelope.channel.clone(),
            publisher: envelope.publisher.clone(),
            protocol: envelope.protocol.clone(),
            content_type: envelope.content_type.clone(),
            name: record.name.clone().unwrap_or_default(),
            unit: record.unit.clone(),
            value: record.value,
            string_value: record.string_value.clone(),
            bool_value: record.bool_value,
            data_value: record.data_value.clone(),
            value_sum: record.sum,
            time: record.time,
            update_time: record.update_time,
            link: record.link.clone(),
            timestamp: timestamp.to_string(),
        })
    }
}
