use async_trait::async_trait;

use super::{DomainResult, Observation};

/// Source of per-message write sessions
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Acquire a session owned exclusively by one message.
    /// Fails with `DomainError::ConnectionError`.
    async fn open_session(&self) -> DomainResult<Box<dyn ObservationSession>>;
}

/// Write handle for one message's observations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObservationSession: Send {
    /// Persist one observation as an independent insert
    async fn insert(&mut self, observation: &Observation) -> DomainResult<()>;

    /// Release the session
    async fn close(&mut self) -> DomainResult<()>;
}
