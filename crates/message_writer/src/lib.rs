pub mod clickhouse;
pub mod domain;
pub mod message_writer;
pub mod nats;

pub use clickhouse::*;
pub use domain::*;
pub use message_writer::*;
pub use nats::*;
