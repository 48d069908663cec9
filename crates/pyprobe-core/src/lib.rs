#![deny(clippy::all, warnings)]

mod config;
mod driver;
mod errors;
mod executor;
mod parse;
mod process;
mod python;
mod sandbox;

pub use config::Settings;
pub use errors::ParseError;
pub use parse::{parse_setup, parse_setup_with};
pub use sandbox::SandboxSession;

pub use pyprobe_protocol::{
    decode_envelope, split_envelope, EnvelopeError, ParseRequest, SetupMetadata, DIAGNOSTICS_KEY,
    FALLBACK_ERROR_KEY, OUTPUT_DELIMITER,
};
