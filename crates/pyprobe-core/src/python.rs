use which::which;

use crate::config::Settings;
use crate::errors::ParseError;

/// Picks the interpreter for trusted execution: the configured override
/// first, then `python3`, then `python` on `PATH`.
pub(crate) fn detect_interpreter(settings: &Settings) -> Result<String, ParseError> {
    if let Some(explicit) = settings.python.as_deref() {
        return Ok(explicit.to_string());
    }
    for candidate in ["python3", "python"] {
        if let Ok(path) = which(candidate) {
            return Ok(path.to_string_lossy().to_string());
        }
    }
    Err(ParseError::PythonMissing)
}
