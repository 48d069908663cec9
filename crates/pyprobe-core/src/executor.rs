//! Trusted execution: run the script on a host interpreter, no isolation.

use std::path::Path;

use pyprobe_protocol::{decode_envelope, SetupMetadata};

use crate::config::Settings;
use crate::driver;
use crate::errors::ParseError;
use crate::process;
use crate::python;

/// Runs the driver on `setup_py` with a host interpreter and decodes the
/// resulting envelope. `setup_py` must already be canonical; the child runs
/// from the script's directory and never touches this process's state.
pub(crate) fn run_trusted(
    settings: &Settings,
    setup_py: &Path,
    mock_imports: bool,
) -> Result<SetupMetadata, ParseError> {
    let python = python::detect_interpreter(settings)?;
    let scratch = tempfile::tempdir().map_err(|source| ParseError::DriverStage { source })?;
    let driver_path = driver::stage_driver(scratch.path())?;

    let mut args = vec![driver_path.display().to_string()];
    if mock_imports {
        args.push("--mockimports".to_string());
    }
    args.push(setup_py.display().to_string());

    let workdir = setup_py.parent().unwrap_or_else(|| Path::new("."));
    // keep byte-code caches out of the target package
    let envs = [("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string())];
    let output = process::run_command(
        &python,
        &args,
        &envs,
        workdir,
        settings.max_capture_bytes,
    )
    .map_err(|source| ParseError::Launch {
        program: python.clone(),
        detail: format!("{source:#}"),
    })?;

    if output.code != 0 {
        return Err(ParseError::ExecutionFailed {
            output: process::combined_output(&output),
        });
    }
    tracing::debug!(python = %python, script = %setup_py.display(), "trusted parse completed");
    Ok(decode_envelope(&output.stdout)?)
}
