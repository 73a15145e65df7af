use senml::SenmlError;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Envelope decode error: {0}")]
    DecodeError(String),

    #[error("Measurement format error: {0}")]
    FormatError(#[from] SenmlError),

    #[error("Observation mapping error at record {index}: {reason}")]
    MappingError { index: usize, reason: String },

    #[error("Persistence error at record {index}: {source}")]
    PersistenceError {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Connection error: {0}")]
    ConnectionError(#[source] anyhow::Error),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DecodeError(_) => "decode",
            Self::FormatError(_) => "format",
            Self::MappingError { .. } => "mapping",
            Self::PersistenceError { .. } => "persistence",
            Self::ConnectionError(_) => "connection",
            Self::RepositoryError(_) => "repository",
        }
    }

    /// Attribute a store failure to the record being written
    pub fn into_persistence(self, index: usize) -> Self {
        match self {
            Self::RepositoryError(source) => Self::PersistenceError { index, source },
            already @ Self::PersistenceError { .. } => already,
            other => Self::PersistenceError {
                index,
                source: anyhow::Error::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_becomes_persistence_error() {
        let err = DomainError::RepositoryError(anyhow::anyhow!("connection reset"))
            .into_persistence(2);

        match &err {
            DomainError::PersistenceError { index, source } => {
                assert_eq!(*index, 2);
                assert_eq!(source.to_string(), "connection reset");
            }
            other => panic!("Expected PersistenceError, got {:?}", other),
        }
        assert_eq!(err.kind(), "persistence");
        assert_eq!(
            err.to_string(),
            "Persistence error at record 2: connection reset"
        );
    }

    #[test]
    fn test_format_error_from_senml() {
        let err: DomainError = SenmlError::NotAnArray.into();
        assert_eq!(err.kind(), "format");
    }
}
