mod envelope;
mod error;
mod message_pipeline;
mod observation;
mod observation_store;

pub use envelope::*;
pub use error::*;
pub use message_pipeline::*;
pub use observation::*;
pub use observation_store::*;
