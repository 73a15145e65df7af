use serde_json::Value as Json;

use crate::error::{Result, SenmlError};
use crate::record::{Record, SUPPORTED_VERSION};

/// Decode a JSON SenML pack into raw records, preserving source order.
///
/// Labels ending in `_` must be understood by the receiver (RFC 8428
/// section 4.4) and are rejected since no extensions are supported. Other
/// unknown labels are ignored.
pub fn decode(bytes: &[u8]) -> Result<Vec<Record>> {
    let document: Json = serde_json::from_slice(bytes)?;

    let Json::Array(entries) = document else {
        return Err(SenmlError::NotAnArray);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| decode_record(index, entry))
        .collect()
}

fn decode_record(index: usize, entry: Json) -> Result<Record> {
    let Json::Object(fields) = &entry else {
        return Err(SenmlError::InvalidRecord {
            index,
            reason: "expected a JSON object".to_string(),
        });
    };

    if let Some(label) = fields.keys().find(|label| label.ends_with('_')) {
        return Err(SenmlError::MustUnderstand {
            index,
            label: label.clone(),
        });
    }

    let record: Record =
        serde_json::from_value(entry).map_err(|e| SenmlError::InvalidRecord {
            index,
            reason: e.to_string(),
        })?;

    if record.value_count() > 1 {
        return Err(SenmlError::MultipleValues { index });
    }

    match record.base_version {
        Some(version) if version > SUPPORTED_VERSION => {
            Err(SenmlError::UnsupportedVersion { index, version })
        }
        _ => Ok(record),
    }
}
