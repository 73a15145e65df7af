mod client;
mod middleware;
mod subscription_consumer;
mod trace_context;
mod traits;

pub use client::*;
pub use middleware::*;
pub use subscription_consumer::*;
pub use trace_context::*;
pub use traits::*;
