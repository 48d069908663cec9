use std::path::PathBuf;

use pyprobe_protocol::EnvelopeError;

/// Everything that can go wrong between a parse request and its metadata.
///
/// Messages embed the raw captured output where the failure came from the
/// script or the container, so callers can surface it verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("file not found: '{}'", path.display())]
    MissingFile { path: PathBuf },
    #[error("package root not found: '{}'", path.display())]
    MissingRoot { path: PathBuf },
    #[error("'{}' is not inside the package root '{}'", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("no python interpreter found; set PYPROBE_PYTHON")]
    PythonMissing,
    #[error(
        "container backend unavailable; install podman or docker, or set PYPROBE_SANDBOX_BACKEND to a compatible binary"
    )]
    BackendUnavailable,
    #[error("container backend program not found: '{program}'")]
    BackendNotFound { program: String },
    #[error("failed to stage the execution driver: {source}")]
    DriverStage { source: std::io::Error },
    #[error("failed to locate the executable to mount: {source}")]
    CodeMount { source: std::io::Error },
    #[error("failed to run {program}: {detail}")]
    Launch { program: String, detail: String },
    #[error("failed to start sandbox container from '{image}': {output}")]
    SandboxStart { image: String, output: String },
    #[error("setup script execution failed: {output}")]
    ExecutionFailed { output: String },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}
