use std::collections::HashMap;
use std::env;

const DEFAULT_PRIMARY_IMAGE: &str = "pyprobe/runtime:py3";
const DEFAULT_FALLBACK_IMAGE: &str = "pyprobe/runtime:py2.7";
const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Runtime knobs, all environment-driven with baked-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Interpreter for the trusted path (`PYPROBE_PYTHON`); `None` means
    /// discover `python3`/`python` on `PATH`.
    pub python: Option<String>,
    /// Container backend override (`PYPROBE_SANDBOX_BACKEND`): `docker`,
    /// `podman`, or a path to any CLI-compatible program.
    pub backend: Option<String>,
    /// Image for the first sandbox attempt (`PYPROBE_SANDBOX_IMAGE`).
    pub primary_image: String,
    /// Image for the retry on a legacy interpreter
    /// (`PYPROBE_SANDBOX_IMAGE_FALLBACK`).
    pub fallback_image: String,
    /// Per-stream cap on captured child output
    /// (`PYPROBE_MAX_CAPTURE_BYTES`).
    pub max_capture_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python: None,
            backend: None,
            primary_image: DEFAULT_PRIMARY_IMAGE.to_string(),
            fallback_image: DEFAULT_FALLBACK_IMAGE.to_string(),
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

impl Settings {
    /// Builds settings from the current process environment.
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            python: non_empty(snapshot.var("PYPROBE_PYTHON")),
            backend: non_empty(snapshot.var("PYPROBE_SANDBOX_BACKEND")),
            primary_image: non_empty(snapshot.var("PYPROBE_SANDBOX_IMAGE"))
                .unwrap_or(defaults.primary_image),
            fallback_image: non_empty(snapshot.var("PYPROBE_SANDBOX_IMAGE_FALLBACK"))
                .unwrap_or(defaults.fallback_image),
            max_capture_bytes: snapshot
                .var("PYPROBE_MAX_CAPTURE_BYTES")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_capture_bytes),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
