use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenmlError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("measurement pack must be a JSON array")]
    NotAnArray,

    #[error("invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("record at index {index} carries more than one value field")]
    MultipleValues { index: usize },

    #[error("record at index {index} uses must-understand label '{label}'")]
    MustUnderstand { index: usize, label: String },

    #[error("record at index {index} declares unsupported version {version}")]
    UnsupportedVersion { index: usize, version: i64 },
}

pub type Result<T> = std::result::Result<T, SenmlError>;
