#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod envelope;
pub mod metadata;
pub mod request;

pub use envelope::{decode_envelope, split_envelope, EnvelopeError, OUTPUT_DELIMITER};
pub use metadata::{SetupMetadata, DIAGNOSTICS_KEY, FALLBACK_ERROR_KEY};
pub use request::ParseRequest;
