use serde::{Deserialize, Serialize};

/// Highest `bver` understood by this crate.
pub const SUPPORTED_VERSION: i64 = 10;

/// One SenML record using the JSON labels from RFC 8428.
///
/// Every field is optional on the wire. A raw record may depend on base
/// fields declared by an earlier record in the same pack; a resolved record
/// carries no base fields at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "bn", default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    #[serde(rename = "bt", default, skip_serializing_if = "Option::is_none")]
    pub base_time: Option<f64>,
    #[serde(rename = "bu", default, skip_serializing_if = "Option::is_none")]
    pub base_unit: Option<String>,
    #[serde(rename = "bv", default, skip_serializing_if = "Option::is_none")]
    pub base_value: Option<f64>,
    #[serde(rename = "bs", default, skip_serializing_if = "Option::is_none")]
    pub base_sum: Option<f64>,
    #[serde(rename = "bver", default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<i64>,

    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "vs", default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(rename = "vb", default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(rename = "vd", default, skip_serializing_if = "Option::is_none")]
    pub data_value: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(rename = "ut", default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<f64>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Borrowed view of the single value a record carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Number(f64),
    String(&'a str),
    Bool(bool),
    Data(&'a str),
}

impl Record {
    /// The record's value, if it carries one.
    pub fn value_kind(&self) -> Option<Value<'_>> {
        if let Some(v) = self.value {
            return Some(Value::Number(v));
        }
        if let Some(vs) = self.string_value.as_deref() {
            return Some(Value::String(vs));
        }
        if let Some(vb) = self.bool_value {
            return Some(Value::Bool(vb));
        }
        self.data_value.as_deref().map(Value::Data)
    }

    pub fn has_base_fields(&self) -> bool {
        self.base_name.is_some()
            || self.base_time.is_some()
            || self.base_unit.is_some()
            || self.base_value.is_some()
            || self.base_sum.is_some()
            || self.base_version.is_some()
    }

    pub(crate) fn value_count(&self) -> usize {
        [
            self.value.is_some(),
            self.string_value.is_some(),
            self.bool_value.is_some(),
            self.data_value.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}
