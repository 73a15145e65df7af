use crate::nats::traits::{NatsSubscriber, Subscription};
use crate::nats::ConsumeRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Successfully connected to NATS");
        Ok(Self { client })
    }

    /// Create a NatsSubscriber trait object from this client
    pub fn create_subscriber_client(&self) -> Arc<dyn NatsSubscriber> {
        Arc::new(NatsCoreSubscriber::new(self.client.clone()))
    }

    /// Flush buffered protocol traffic before the connection is dropped
    pub async fn close(&self) {
        info!("Closing NATS connection");
        if let Err(e) = self.client.flush().await {
            error!(error = %e, "Failed to flush NATS connection");
        }
    }
}

/// Concrete implementation of NatsSubscriber using core NATS subscriptions
pub struct NatsCoreSubscriber {
    client: async_nats::Client,
}

impl NatsCoreSubscriber {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NatsSubscriber for NatsCoreSubscriber {
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<String>,
    ) -> Result<Box<dyn Subscription>> {
        let subscriber = match queue_group {
            Some(group) => {
                debug!(subject = %subject, queue_group = %group, "subscribing with queue group");
                self.client
                    .queue_subscribe(subject.to_string(), group)
                    .await
            }
            None => self.client.subscribe(subject.to_string()).await,
        }
        .context("Failed to subscribe")?;

        Ok(Box::new(NatsSubscription { subscriber }))
    }
}

/// Concrete implementation of Subscription over an async-nats subscriber
pub struct NatsSubscription {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_message(&mut self) -> Option<ConsumeRequest> {
        let message = self.subscriber.next().await?;
        Some(ConsumeRequest::new(
            message.subject.to_string(),
            message.payload,
            message.headers,
        ))
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.subscriber
            .unsubscribe()
            .await
            .context("Failed to unsubscribe")
    }
}
