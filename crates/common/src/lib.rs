pub mod clickhouse;
pub mod nats;
pub mod retry;
pub mod telemetry;

pub use clickhouse::*;
pub use nats::*;
pub use retry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use nats::MockNatsSubscriber;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockSubscription;
