use crate::nats::ConsumeRequest;
use anyhow::Result;
use async_trait::async_trait;

/// Opens core NATS subscriptions.
/// Abstracts the client so consumers can be exercised without a server.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NatsSubscriber: Send + Sync {
    /// Subscribe to a subject pattern, optionally as a member of a queue group
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<String>,
    ) -> Result<Box<dyn Subscription>>;
}

/// A live subscription delivering owned messages
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `None` means the subscription is closed.
    async fn next_message(&mut self) -> Option<ConsumeRequest>;

    /// Stop receiving messages
    async fn unsubscribe(&mut self) -> Result<()>;
}
