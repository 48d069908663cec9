//! Parse entry points and the two-image fallback policy.

use std::fs;
use std::path::{Path, PathBuf};

use pyprobe_protocol::{ParseRequest, SetupMetadata};

use crate::config::Settings;
use crate::errors::ParseError;
use crate::executor;
use crate::sandbox::SandboxSession;

/// Extracts the `setup()` arguments of `request.filename`.
///
/// Settings come from the process environment; see [`parse_setup_with`] for
/// the injectable form.
pub fn parse_setup(request: &ParseRequest) -> Result<SetupMetadata, ParseError> {
    parse_setup_with(&Settings::from_env(), request)
}

/// Like [`parse_setup`], with explicit [`Settings`].
///
/// Untrusted requests run inside a container from the primary image; if that
/// attempt fails for any reason, one retry runs on the legacy-interpreter
/// image. A successful retry carries the primary error as the
/// `python3_error` annotation; a failed retry surfaces the primary error
/// alone.
pub fn parse_setup_with(
    settings: &Settings,
    request: &ParseRequest,
) -> Result<SetupMetadata, ParseError> {
    let setup_py = fs::canonicalize(&request.filename).map_err(|_| ParseError::MissingFile {
        path: request.filename.clone(),
    })?;
    if !setup_py.is_file() {
        return Err(ParseError::MissingFile { path: setup_py });
    }

    if request.trusted {
        return executor::run_trusted(settings, &setup_py, request.mock_imports);
    }

    let package_root = setup_py
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    match sandboxed_parse(
        settings,
        &package_root,
        &settings.primary_image,
        &setup_py,
        request.mock_imports,
    ) {
        Ok(metadata) => Ok(metadata),
        Err(primary) => {
            tracing::warn!(
                error = %primary,
                image = %settings.fallback_image,
                "primary sandbox parse failed; retrying on the legacy-interpreter image"
            );
            match sandboxed_parse(
                settings,
                &package_root,
                &settings.fallback_image,
                &setup_py,
                request.mock_imports,
            ) {
                Ok(mut metadata) => {
                    metadata.set_fallback_error(primary.to_string());
                    Ok(metadata)
                }
                Err(fallback) => {
                    tracing::debug!(error = %fallback, "fallback sandbox parse failed as well");
                    Err(primary)
                }
            }
        }
    }
}

fn sandboxed_parse(
    settings: &Settings,
    package_root: &Path,
    image: &str,
    setup_py: &Path,
    mock_imports: bool,
) -> Result<SetupMetadata, ParseError> {
    let session = SandboxSession::start(settings, package_root, image)?;
    session.parse(setup_py, mock_imports)
}
