use async_nats::HeaderMap;
use bytes::Bytes;

/// Request type for handling a single NATS message through Tower.
///
/// Owns all of the message data so it can be moved into a spawned task and
/// passed through middleware layers without lifetime concerns.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// The subject the message was published to
    pub subject: String,
    /// The message payload
    pub payload: Bytes,
    /// Optional headers (used for trace context propagation)
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(subject: String, payload: Bytes, headers: Option<HeaderMap>) -> Self {
        Self {
            subject,
            payload,
            headers,
        }
    }
}

/// Result of handling one message.
///
/// Core NATS has no acknowledgement, so this only tells middleware whether
/// the handler did its work or gave up on the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    Processed,
    Dropped(Option<String>),
}

impl ConsumeResponse {
    pub fn processed() -> Self {
        Self::Processed
    }

    pub fn dropped(reason: impl Into<String>) -> Self {
        Self::Dropped(Some(reason.into()))
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Dropped(_) => "dropped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_request_new() {
        let req = ConsumeRequest::new("msg.c1".to_string(), Bytes::from("payload"), None);

        assert_eq!(req.subject, "msg.c1");
        assert_eq!(req.payload, Bytes::from("payload"));
        assert!(req.headers.is_none());
    }

    #[test]
    fn test_consume_response_processed() {
        let resp = ConsumeResponse::processed();
        assert!(resp.is_processed());
        assert_eq!(resp.outcome(), "processed");
    }

    #[test]
    fn test_consume_response_dropped() {
        let resp = ConsumeResponse::dropped("bad payload");
        assert!(!resp.is_processed());
        assert_eq!(resp.outcome(), "dropped");
        assert_eq!(
            resp,
            ConsumeResponse::Dropped(Some("bad payload".to_string()))
        );
    }
}
