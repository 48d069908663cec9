//! What to parse and how much to trust it.

use std::path::PathBuf;

/// A request to extract `setup()` arguments from one build script.
#[derive(Clone, Debug)]
pub struct ParseRequest {
    /// Path to the `setup.py` to execute. Resolved to an absolute path
    /// before execution.
    pub filename: PathBuf,
    /// Execute directly on the host instead of inside a container. The
    /// trusted path runs arbitrary script code with the caller's privileges;
    /// leave this off unless the input is already trusted.
    pub trusted: bool,
    /// Substitute inert stub modules for imports the script cannot resolve
    /// and retry once.
    pub mock_imports: bool,
}

impl ParseRequest {
    /// An untrusted, import-tolerant request; the library default.
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            trusted: false,
            mock_imports: true,
        }
    }
}
