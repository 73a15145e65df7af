mod message_consumer_service;

pub use message_consumer_service::*;
