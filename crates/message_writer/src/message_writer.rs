use crate::domain::{MessagePipeline, ObservationStore};
use crate::nats::MessageConsumerService;
use common::nats::{
    NatsConsumeLoggingLayer, NatsConsumeLoggingService, NatsConsumeTracingConfig,
    NatsConsumeTracingLayer, NatsConsumeTracingService, NatsSubscriber, SubscriptionConsumer,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

type MessageConsumerStack =
    NatsConsumeTracingService<NatsConsumeLoggingService<MessageConsumerService>>;

pub type RunnerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub struct MessageWriterConfig {
    pub subject: String,
    pub queue_group: Option<String>,
    pub service_name: String,
}

/// Subscribes to the message subject and writes every delivery to the store
pub struct MessageWriter {
    consumer: SubscriptionConsumer<MessageConsumerStack>,
}

impl MessageWriter {
    pub async fn new(
        store: Arc<dyn ObservationStore>,
        subscriber: Arc<dyn NatsSubscriber>,
        config: MessageWriterConfig,
    ) -> anyhow::Result<Self> {
        info!(subject = %config.subject, "Initializing message writer");

        let pipeline = Arc::new(MessagePipeline::new(store));
        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(NatsConsumeTracingConfig::new(
                config.service_name,
            )))
            .layer(NatsConsumeLoggingLayer::new())
            .service(MessageConsumerService::new(pipeline));

        let consumer =
            SubscriptionConsumer::new(subscriber, &config.subject, config.queue_group, service)
                .await?;

        info!("Message writer initialized");
        Ok(Self { consumer })
    }

    pub fn into_runner_process(self) -> RunnerProcess {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}
