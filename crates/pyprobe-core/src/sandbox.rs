//! Container-isolated execution, driven through the backend CLI.
//!
//! The container starts detached and idle with two bind mounts: the
//! directory holding this binary (read-only) and the package root
//! (read-write). Each parse then `exec`s the binary itself inside the guest
//! in trusted mode, so the host and sandbox paths share one execution
//! implementation and one envelope format.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pyprobe_protocol::{decode_envelope, SetupMetadata};
use which::which;

use crate::config::Settings;
use crate::errors::ParseError;
use crate::process::{self, RunOutput};

const GUEST_CODE_DIR: &str = "/home/app/code";
const GUEST_DATA_DIR: &str = "/home/app/data";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BackendKind {
    Docker,
    Podman,
    Custom,
}

#[derive(Clone, Debug)]
pub(crate) struct ContainerBackend {
    program: PathBuf,
    kind: BackendKind,
}

impl ContainerBackend {
    pub(crate) fn name(&self) -> &'static str {
        match self.kind {
            BackendKind::Docker => "docker",
            BackendKind::Podman => "podman",
            BackendKind::Custom => "custom",
        }
    }

    fn run(&self, args: &[String], max_capture_bytes: usize) -> Result<RunOutput, ParseError> {
        let program = self.program.to_string_lossy().to_string();
        process::run_command(&program, args, &[], Path::new("."), max_capture_bytes).map_err(
            |source| ParseError::Launch {
                program,
                detail: format!("{source:#}"),
            },
        )
    }
}

#[derive(Clone, Debug)]
struct Mount {
    host: PathBuf,
    guest: PathBuf,
    read_only: bool,
}

/// Picks the container manager: the configured override first (a known
/// backend name or a path to any CLI-compatible program), then `podman` and
/// `docker` on `PATH`.
pub(crate) fn detect_backend(settings: &Settings) -> Result<ContainerBackend, ParseError> {
    if let Some(raw) = settings.backend.as_deref() {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("podman") {
            return Ok(ContainerBackend {
                program: resolve_program("podman")?,
                kind: BackendKind::Podman,
            });
        }
        if trimmed.eq_ignore_ascii_case("docker") {
            return Ok(ContainerBackend {
                program: resolve_program("docker")?,
                kind: BackendKind::Docker,
            });
        }
        return Ok(ContainerBackend {
            program: resolve_program(trimmed)?,
            kind: BackendKind::Custom,
        });
    }

    for (name, kind) in [
        ("podman", BackendKind::Podman),
        ("docker", BackendKind::Docker),
    ] {
        if let Ok(program) = resolve_program(name) {
            return Ok(ContainerBackend { program, kind });
        }
    }

    Err(ParseError::BackendUnavailable)
}

fn resolve_program(name: &str) -> Result<PathBuf, ParseError> {
    let candidate = if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        PathBuf::from(name)
    } else {
        which(name).unwrap_or_else(|_| PathBuf::from(name))
    };
    if candidate.exists() {
        return Ok(candidate);
    }
    Err(ParseError::BackendNotFound {
        program: name.to_string(),
    })
}

fn canonical_or(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// One running container, parsing files from a fixed package root.
///
/// Dropping the session stops the container; `run --rm` then deletes it.
#[derive(Debug)]
pub struct SandboxSession {
    backend: ContainerBackend,
    container_id: String,
    package_root: PathBuf,
    binary_name: String,
    max_capture_bytes: usize,
}

impl SandboxSession {
    /// Starts an idle container from `image` with this binary's directory
    /// mounted read-only and `package_root` mounted read-write.
    pub fn start(
        settings: &Settings,
        package_root: &Path,
        image: &str,
    ) -> Result<Self, ParseError> {
        let backend = detect_backend(settings)?;
        let package_root = canonical_or(package_root);
        if !package_root.is_dir() {
            return Err(ParseError::MissingRoot { path: package_root });
        }
        let binary = env::current_exe().map_err(|source| ParseError::CodeMount { source })?;
        let binary = canonical_or(&binary);
        let code_dir = binary.parent().unwrap_or_else(|| Path::new("."));
        let binary_name = binary
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "pyprobe".to_string());

        let mounts = [
            Mount {
                host: code_dir.to_path_buf(),
                guest: PathBuf::from(GUEST_CODE_DIR),
                read_only: true,
            },
            Mount {
                host: package_root.clone(),
                guest: PathBuf::from(GUEST_DATA_DIR),
                read_only: false,
            },
        ];
        let args = build_start_args(&mounts, image);
        let output = backend.run(&args, settings.max_capture_bytes)?;
        if output.code != 0 {
            return Err(ParseError::SandboxStart {
                image: image.to_string(),
                output: process::combined_output(&output),
            });
        }
        let container_id = output.stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(ParseError::SandboxStart {
                image: image.to_string(),
                output: "backend reported no container id".to_string(),
            });
        }
        tracing::debug!(
            backend = backend.name(),
            container = %container_id,
            image = %image,
            "sandbox container started"
        );
        Ok(Self {
            backend,
            container_id,
            package_root,
            binary_name,
            max_capture_bytes: settings.max_capture_bytes,
        })
    }

    /// Parses one setup.py under the package root inside the container.
    ///
    /// The path must resolve to an existing file inside the root; both are
    /// checked before any command is issued.
    pub fn parse(&self, setup_py: &Path, mock_imports: bool) -> Result<SetupMetadata, ParseError> {
        let setup_py = fs::canonicalize(setup_py).map_err(|_| ParseError::MissingFile {
            path: setup_py.to_path_buf(),
        })?;
        if !setup_py.is_file() {
            return Err(ParseError::MissingFile { path: setup_py });
        }
        let guest = guest_path(&self.package_root, &setup_py)?;
        let args = build_exec_args(
            &self.container_id,
            &self.binary_name,
            &guest,
            mock_imports,
        );
        let output = self.backend.run(&args, self.max_capture_bytes)?;
        if output.code != 0 {
            return Err(ParseError::ExecutionFailed {
                output: process::combined_output(&output),
            });
        }
        Ok(decode_envelope(&output.stdout)?)
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        let args = ["stop".to_string(), self.container_id.clone()];
        match self.backend.run(&args, self.max_capture_bytes) {
            Ok(output) if output.code == 0 => {
                tracing::debug!(container = %self.container_id, "sandbox container stopped");
            }
            Ok(output) => {
                tracing::warn!(
                    container = %self.container_id,
                    code = output.code,
                    "failed to stop sandbox container"
                );
            }
            Err(err) => {
                tracing::warn!(
                    container = %self.container_id,
                    error = %err,
                    "failed to stop sandbox container"
                );
            }
        }
    }
}

/// Maps a host path to its in-container location under the data mount,
/// rejecting anything outside the package root.
fn guest_path(package_root: &Path, setup_py: &Path) -> Result<PathBuf, ParseError> {
    let relative = setup_py
        .strip_prefix(package_root)
        .map_err(|_| ParseError::OutsideRoot {
            path: setup_py.to_path_buf(),
            root: package_root.to_path_buf(),
        })?;
    Ok(Path::new(GUEST_DATA_DIR).join(relative))
}

fn build_start_args(mounts: &[Mount], image: &str) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string(), "-dt".to_string()];
    for mount in mounts {
        let mode = if mount.read_only { "ro,Z" } else { "rw,Z" };
        args.push("--volume".to_string());
        args.push(format!(
            "{}:{}:{mode}",
            mount.host.display(),
            mount.guest.display()
        ));
    }
    args.push(image.to_string());
    args
}

fn build_exec_args(
    container_id: &str,
    binary_name: &str,
    guest: &Path,
    mock_imports: bool,
) -> Vec<String> {
    let mut args = vec!["exec".to_string(), container_id.to_string()];
    args.push(format!("{GUEST_CODE_DIR}/{binary_name}"));
    args.push("--trusted".to_string());
    args.push("--printdelimiter".to_string());
    if mock_imports {
        args.push("--mockimports".to_string());
    }
    args.push(guest.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_path_maps_nested_files_under_the_data_mount() {
        let root = Path::new("/work/pkg");
        let guest = guest_path(root, Path::new("/work/pkg/sub/setup.py")).expect("contained");
        assert_eq!(guest, Path::new("/home/app/data/sub/setup.py"));
    }

    #[test]
    fn guest_path_accepts_files_directly_in_the_root() {
        let root = Path::new("/work/pkg");
        let guest = guest_path(root, Path::new("/work/pkg/setup.py")).expect("contained");
        assert_eq!(guest, Path::new("/home/app/data/setup.py"));
    }

    #[test]
    fn guest_path_rejects_escapes() {
        let root = Path::new("/work/pkg");
        let err = guest_path(root, Path::new("/work/other/setup.py")).unwrap_err();
        assert!(matches!(err, ParseError::OutsideRoot { .. }));
        let rendered = err.to_string();
        assert!(rendered.contains("/work/other/setup.py"));
        assert!(rendered.contains("/work/pkg"));
    }

    #[test]
    fn start_args_mount_code_read_only_and_data_read_write() {
        let mounts = [
            Mount {
                host: PathBuf::from("/opt/tool/bin"),
                guest: PathBuf::from(GUEST_CODE_DIR),
                read_only: true,
            },
            Mount {
                host: PathBuf::from("/work/pkg"),
                guest: PathBuf::from(GUEST_DATA_DIR),
                read_only: false,
            },
        ];
        let args = build_start_args(&mounts, "pyprobe/runtime:py3");
        assert_eq!(args[..3], ["run", "--rm", "-dt"]);
        assert!(args.contains(&"/opt/tool/bin:/home/app/code:ro,Z".to_string()));
        assert!(args.contains(&"/work/pkg:/home/app/data:rw,Z".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pyprobe/runtime:py3"));
    }

    #[test]
    fn exec_args_reinvoke_the_tool_in_trusted_mode() {
        let args = build_exec_args(
            "abc123",
            "pyprobe",
            Path::new("/home/app/data/setup.py"),
            true,
        );
        assert_eq!(
            args,
            [
                "exec",
                "abc123",
                "/home/app/code/pyprobe",
                "--trusted",
                "--printdelimiter",
                "--mockimports",
                "/home/app/data/setup.py",
            ]
        );
    }

    #[test]
    fn exec_args_omit_mockimports_when_disabled() {
        let args = build_exec_args("abc123", "pyprobe", Path::new("/home/app/data/setup.py"), false);
        assert!(!args.contains(&"--mockimports".to_string()));
    }

    #[test]
    fn custom_backend_override_accepts_a_program_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fake = dir.path().join("fake-runtime");
        fs::write(&fake, "#!/bin/sh\nexit 0\n").expect("writable");
        let settings = Settings {
            backend: Some(fake.display().to_string()),
            ..Settings::default()
        };
        let backend = detect_backend(&settings).expect("custom program accepted");
        assert_eq!(backend.kind, BackendKind::Custom);
        assert_eq!(backend.name(), "custom");
    }

    #[test]
    fn unknown_backend_override_is_reported() {
        let settings = Settings {
            backend: Some("no-such-container-tool-x9".to_string()),
            ..Settings::default()
        };
        let err = detect_backend(&settings).unwrap_err();
        assert!(matches!(err, ParseError::BackendNotFound { .. }));
    }
}
