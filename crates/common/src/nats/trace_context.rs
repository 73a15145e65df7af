use async_nats::HeaderMap;
use opentelemetry::{global, propagation::Extractor, Context};

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

/// Read-only view of NATS headers for the global text map propagator
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        [TRACEPARENT, TRACESTATE]
            .into_iter()
            .filter(|key| self.0.get(*key).is_some())
            .collect()
    }
}

/// Extract the publisher's trace context from NATS headers.
///
/// Falls back to an empty context when no propagator is installed or the
/// headers carry no usable `traceparent`.
pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}
