use crate::domain::MessagePipeline;
use common::nats::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Tower service running one delivered NATS message through the pipeline.
///
/// Failures are already logged with their message context by the pipeline;
/// here they only turn into a `Dropped` response. The service never errors,
/// so one bad message cannot stop the subscription.
#[derive(Clone)]
pub struct MessageConsumerService {
    pipeline: Arc<MessagePipeline>,
}

impl MessageConsumerService {
    pub fn new(pipeline: Arc<MessagePipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<ConsumeRequest> for MessageConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let pipeline = self.pipeline.clone();

        Box::pin(async move {
            let outcome = pipeline.process(&req.payload).await;

            match outcome.error {
                None => Ok(ConsumeResponse::processed()),
                Some(e) => Ok(ConsumeResponse::dropped(format!("{}: {}", outcome.state, e))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DomainError, MockObservationSession, MockObservationStore, ObservationSession,
    };
    use bytes::Bytes;
    use common::nats::{NatsConsumeLoggingLayer, NatsConsumeTracingConfig, NatsConsumeTracingLayer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{ServiceBuilder, ServiceExt};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
    use tracing_subscriber::Layer;

    fn request(payload: &'static [u8]) -> ConsumeRequest {
        ConsumeRequest::new("msg.c1".to_string(), Bytes::from_static(payload), None)
    }

    /// Counts events at warn or error
    #[derive(Clone, Default)]
    struct DiagnosticCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for DiagnosticCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
            if *event.metadata().level() <= Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn diagnostics_for(store: MockObservationStore, payload: &'static [u8]) -> usize {
        let counter = DiagnosticCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(NatsConsumeTracingConfig::new(
                "senml-bridge-test".to_string(),
            )))
            .layer(NatsConsumeLoggingLayer::new())
            .service(MessageConsumerService::new(Arc::new(MessagePipeline::new(
                Arc::new(store),
            ))));

        let response = service.oneshot(request(payload)).await.unwrap();
        assert!(!response.is_processed());

        counter.0.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_stored_message_is_processed() {
        let mut session = MockObservationSession::new();
        session.expect_insert().times(1).returning(|_| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));
        let mut store = MockObservationStore::new();
        store
            .expect_open_session()
            .times(1)
            .return_once(move || Ok(Box::new(session) as Box<dyn ObservationSession>));

        let service = MessageConsumerService::new(Arc::new(MessagePipeline::new(Arc::new(store))));

        let response = service
            .oneshot(request(
                br#"{"channel":"c1","publisher":"p1","protocol":"mqtt","payload":[{"n":"temp","v":1}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response, ConsumeResponse::Processed);
    }

    #[tokio::test]
    async fn test_empty_message_is_processed() {
        let mut store = MockObservationStore::new();
        store.expect_open_session().never();
        let service = MessageConsumerService::new(Arc::new(MessagePipeline::new(Arc::new(store))));

        let response = service.oneshot(request(b"")).await.unwrap();

        assert!(response.is_processed());
    }

    #[tokio::test]
    async fn test_failed_message_is_dropped_not_errored() {
        let mut store = MockObservationStore::new();
        store.expect_open_session().times(1).returning(|| {
            Err(DomainError::ConnectionError(anyhow::anyhow!("no route to host")))
        });
        let service = MessageConsumerService::new(Arc::new(MessagePipeline::new(Arc::new(store))));

        let response = service
            .oneshot(request(
                br#"{"channel":"c1","publisher":"p1","protocol":"mqtt","payload":[{"n":"temp","v":1}]}"#,
            ))
            .await
            .unwrap();

        match response {
            ConsumeResponse::Dropped(Some(reason)) => {
                assert!(reason.starts_with("failed(0)"));
                assert!(reason.contains("no route to host"));
            }
            other => panic!("Expected Dropped, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dropped() {
        let mut store = MockObservationStore::new();
        store.expect_open_session().never();
        let service = MessageConsumerService::new(Arc::new(MessagePipeline::new(Arc::new(store))));

        let response = service.oneshot(request(b"\x00\x01")).await.unwrap();

        assert!(!response.is_processed());
    }

    #[tokio::test]
    async fn test_malformed_message_logs_one_diagnostic_line() {
        let mut store = MockObservationStore::new();
        store.expect_open_session().never();

        assert_eq!(diagnostics_for(store, b"not json").await, 1);
    }

    #[tokio::test]
    async fn test_rejected_insert_logs_one_diagnostic_line() {
        let mut session = MockObservationSession::new();
        session
            .expect_insert()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("insert rejected"))));
        session.expect_close().times(1).returning(|| Ok(()));
        let mut store = MockObservationStore::new();
        store
            .expect_open_session()
            .times(1)
            .return_once(move || Ok(Box::new(session) as Box<dyn ObservationSession>));

        let payload =
            br#"{"channel":"c1","publisher":"p1","protocol":"mqtt","payload":[{"n":"temp","v":1}]}"#;
        assert_eq!(diagnostics_for(store, payload).await, 1);
    }
}
