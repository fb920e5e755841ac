//! Shared request-surface types for the restql query compiler.
//!
//! This crate holds everything both the compiler pipeline and its callers
//! need to agree on: the wire error object with its `PGRST` code space,
//! `Accept` content negotiation, `Prefer` header parsing, and the
//! `Range`/`Content-Range` contract.

pub mod error;
pub mod media;
pub mod prefer;
pub mod range;

pub use error::{ApiError, ErrorCode};
pub use media::MediaType;
pub use prefer::{CountMode, MissingMode, Preferences, Resolution, ReturnMode};
pub use range::{ContentRange, RequestRange};
