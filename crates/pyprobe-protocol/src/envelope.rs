//! Delimiter-framed text envelope carried between execution layers.
//!
//! The layer that runs a build script emits whatever the script printed,
//! then a fixed delimiter, then one JSON document with the captured
//! arguments; the layer above splits on the delimiter and parses the final
//! segment. The same frame crosses the container boundary unchanged, so the
//! sandbox decodes the output of the trusted executor it re-invoked inside
//! the guest with the code below.

use serde_json::Value;

use crate::metadata::SetupMetadata;

/// Separates diagnostic output from the JSON payload.
///
/// A script that prints this exact sequence itself corrupts the frame; that
/// is a known limitation of the format, not defended against.
pub const OUTPUT_DELIMITER: &str = "\n{{ENDOUTPUT}}\n";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("executor output did not contain the output delimiter: {output}")]
    MissingDelimiter { output: String },
    #[error("metadata payload is not valid JSON ({source}): {payload}")]
    InvalidPayload {
        payload: String,
        source: serde_json::Error,
    },
    #[error("metadata payload is not a JSON object: {payload}")]
    UnexpectedPayload { payload: String },
}

/// Splits captured output into diagnostics and payload text.
///
/// Returns `None` when the delimiter never appears. Repeated delimiters are
/// tolerated: the final segment is the payload and the earlier segments are
/// rejoined with a newline.
pub fn split_envelope(output: &str) -> Option<(String, &str)> {
    if !output.contains(OUTPUT_DELIMITER) {
        return None;
    }
    let mut sections: Vec<&str> = output.split(OUTPUT_DELIMITER).collect();
    let payload = sections.pop()?;
    Some((sections.join("\n"), payload))
}

/// Decodes a captured envelope into [`SetupMetadata`].
///
/// The payload must parse as a JSON object. Text before the delimiter is
/// attached as the diagnostics annotation when non-empty.
pub fn decode_envelope(output: &str) -> Result<SetupMetadata, EnvelopeError> {
    let Some((diagnostics, payload)) = split_envelope(output) else {
        return Err(EnvelopeError::MissingDelimiter {
            output: output.to_string(),
        });
    };
    let value: Value =
        serde_json::from_str(payload).map_err(|source| EnvelopeError::InvalidPayload {
            payload: payload.trim().to_string(),
            source,
        })?;
    let Value::Object(args) = value else {
        return Err(EnvelopeError::UnexpectedPayload {
            payload: payload.trim().to_string(),
        });
    };
    let mut metadata = SetupMetadata::from_args(args);
    if !diagnostics.is_empty() {
        metadata.set_diagnostics(diagnostics);
    }
    Ok(metadata)
}
