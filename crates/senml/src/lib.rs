//! Decoding and resolution of SenML (RFC 8428) measurement packs in their
//! JSON representation.
//!
//! A pack is decoded into raw [`Record`]s with [`decode`], then resolved with
//! [`normalize`] (or [`normalize_at`]) into self-contained records that no
//! longer depend on base fields declared by earlier entries.

mod decode;
mod error;
mod normalize;
mod record;

pub use decode::decode;
pub use error::{Result, SenmlError};
pub use normalize::{normalize, normalize_at, RELATIVE_TIME_THRESHOLD};
pub use record::{Record, Value, SUPPORTED_VERSION};
