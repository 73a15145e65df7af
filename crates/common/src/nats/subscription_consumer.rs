use crate::nats::{ConsumeRequest, ConsumeResponse, NatsSubscriber, Subscription};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

/// A core NATS consumer that hands every delivered message to a Tower
/// service.
///
/// Each message runs in its own task, so a slow handler never delays the
/// next delivery. On shutdown the consumer stops reading, unsubscribes and
/// waits for every in-flight handler to finish.
pub struct SubscriptionConsumer<S> {
    subscription: Box<dyn Subscription>,
    subject: String,
    service: S,
    in_flight: JoinSet<()>,
}

impl<S> SubscriptionConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    /// Subscribe to `subject` and prepare to dispatch into `service`
    pub async fn new(
        subscriber: Arc<dyn NatsSubscriber>,
        subject: &str,
        queue_group: Option<String>,
        service: S,
    ) -> Result<Self> {
        debug!(
            subject = %subject,
            queue_group = ?queue_group,
            "creating nats subscription consumer"
        );

        let subscription = subscriber
            .subscribe(subject, queue_group)
            .await
            .with_context(|| format!("failed to subscribe to {subject}"))?;

        info!(subject = %subject, "subscribed");

        Ok(Self {
            subscription,
            subject: subject.to_string(),
            service,
            in_flight: JoinSet::new(),
        })
    }

    /// Run the consumer loop until cancellation or until the subscription
    /// closes underneath it
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        debug!(subject = %self.subject, "starting nats subscription consumer");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(
                        subject = %self.subject,
                        in_flight = self.in_flight.len(),
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                message = self.subscription.next_message() => {
                    match message {
                        Some(request) => self.dispatch(request),
                        None => {
                            self.drain().await;
                            return Err(anyhow!("subscription to {} closed", self.subject));
                        }
                    }
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    log_join(joined);
                }
            }
        }

        if let Err(e) = self.subscription.unsubscribe().await {
            warn!(subject = %self.subject, error = %e, "failed to unsubscribe");
        }
        self.drain().await;

        debug!(subject = %self.subject, "consumer stopped gracefully");
        Ok(())
    }

    fn dispatch(&mut self, request: ConsumeRequest) {
        let service = self.service.clone();

        self.in_flight.spawn(async move {
            let subject = request.subject.clone();
            if let Err(e) = service.oneshot(request).await {
                error!(
                    subject = %subject,
                    error = %e,
                    "service error processing message"
                );
            }
        });
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            log_join(joined);
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "message handler panicked");
    }
}
