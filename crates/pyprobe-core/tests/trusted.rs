use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pyprobe_core::{
    parse_setup_with, EnvelopeError, ParseError, ParseRequest, Settings, DIAGNOSTICS_KEY,
};
use serde_json::json;

/// Locates an interpreter that can run the recording driver. The driver
/// patches setuptools, so an interpreter without it is as unusable as no
/// interpreter at all.
fn find_python() -> Option<String> {
    let candidates = [
        std::env::var("PYTHON").ok(),
        Some("python3".to_string()),
        Some("python".to_string()),
    ];
    for candidate in candidates.into_iter().flatten() {
        let status = Command::new(&candidate)
            .args(["-c", "import setuptools"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if matches!(status, Ok(code) if code.success()) {
            return Some(candidate);
        }
    }
    None
}

fn trusted_settings(python: &str) -> Settings {
    Settings {
        python: Some(python.to_string()),
        ..Settings::default()
    }
}

fn trusted_request(path: &Path, mock_imports: bool) -> ParseRequest {
    ParseRequest {
        filename: path.to_path_buf(),
        trusted: true,
        mock_imports,
    }
}

fn write_setup(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("setup.py");
    fs::write(&path, body).expect("write fixture");
    path
}

#[test]
fn captures_the_declared_arguments_exactly() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"from setuptools import setup

setup(
    name="demo-pkg",
    version="1.2.3",
    install_requires=["requests>=2.0"],
    packages=["demo_pkg"],
)
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("clean parse");

    assert_eq!(metadata.get("name"), Some(&json!("demo-pkg")));
    assert_eq!(metadata.get("version"), Some(&json!("1.2.3")));
    assert_eq!(
        metadata.get("install_requires"),
        Some(&json!(["requests>=2.0"]))
    );
    assert_eq!(metadata.get("packages"), Some(&json!(["demo_pkg"])));
    assert_eq!(metadata.args().len(), 4, "no extra keys on a clean capture");
    assert_eq!(metadata.diagnostics(), None);
    assert_eq!(metadata.fallback_error(), None);
}

#[test]
fn script_prints_become_the_diagnostics_annotation() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"from setuptools import setup

print("reading local requirements")
setup(name="noisy", version="0.1.0")
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("clean parse");

    let diagnostics = metadata.diagnostics().expect("prints captured");
    assert!(diagnostics.contains("reading local requirements"));
    assert_eq!(metadata.args().len(), 2);
    let rendered = metadata.to_value();
    assert!(rendered[DIAGNOSTICS_KEY]
        .as_str()
        .expect("string annotation")
        .contains("reading local requirements"));
}

#[test]
fn unresolvable_imports_fail_without_mocks_and_succeed_with_them() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"import definitely_not_installed_zz
import definitely_not_installed_zz.plugins.loader
from setuptools import setup

setup(name="needs-dep", version=definitely_not_installed_zz.__version__)
"#,
    );

    let err = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .unwrap_err();
    assert!(matches!(err, ParseError::ExecutionFailed { .. }));
    assert!(
        err.to_string().contains("No module named"),
        "the original failure should surface, got: {err}"
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, true),
    )
    .expect("stubbed parse");
    assert_eq!(metadata.get("name"), Some(&json!("needs-dep")));
    assert_eq!(
        metadata.get("version"),
        Some(&json!("1.0.0")),
        "stub modules answer __version__ with the sentinel"
    );
}

#[test]
fn scripts_that_never_call_setup_are_an_error() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"print("configuring")
VERSION = "3.0"
"#,
    );

    let err = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .unwrap_err();
    assert!(matches!(err, ParseError::ExecutionFailed { .. }));
    assert!(err.to_string().contains("setup() was never called"));
}

#[test]
fn clean_exit_without_a_frame_is_a_hard_failure_with_raw_output() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"import sys

print("bailing early")
sys.exit(0)
"#,
    );

    let err = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .unwrap_err();
    match err {
        ParseError::Envelope(EnvelopeError::MissingDelimiter { output }) => {
            assert!(output.contains("bailing early"));
        }
        other => panic!("expected a missing-delimiter error, got: {other}"),
    }
}

#[test]
fn nonzero_exit_surfaces_the_captured_output() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"import sys

sys.stderr.write("disk on fire\n")
sys.exit(3)
"#,
    );

    let err = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .unwrap_err();
    match err {
        ParseError::ExecutionFailed { output } => {
            assert!(output.contains("exit status 3"));
            assert!(output.contains("disk on fire"));
        }
        other => panic!("expected an execution failure, got: {other}"),
    }
}

#[test]
fn awkward_values_coerce_to_json_friendly_forms() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"from setuptools import setup

setup(
    name=b"byte-name",
    version="0.0.7",
    keywords={"alpha", "beta"},
    license=object(),
)
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("coercible parse");

    assert_eq!(metadata.get("name"), Some(&json!("byte-name")));
    let keywords = metadata
        .get("keywords")
        .and_then(|value| value.as_array())
        .expect("sets flatten to lists");
    assert_eq!(keywords.len(), 2);
    assert!(keywords.contains(&json!("alpha")));
    assert!(keywords.contains(&json!("beta")));
    let license = metadata
        .get("license")
        .and_then(|value| value.as_str())
        .expect("exotic objects stringify");
    assert!(license.contains("object"));
}

#[test]
fn the_last_setup_call_wins() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"from setuptools import setup

setup(name="first", version="0.1")
setup(name="second", version="0.2")
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("clean parse");
    assert_eq!(metadata.get("name"), Some(&json!("second")));
    assert_eq!(metadata.get("version"), Some(&json!("0.2")));
    assert_eq!(metadata.args().len(), 2);
}

#[test]
fn the_script_runs_from_its_own_directory_with_itself_on_the_path() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("helper_mod.py"), "VERSION = \"9.9.9\"\n").expect("write helper");
    let setup_py = write_setup(
        dir.path(),
        r#"import os
import helper_mod
from setuptools import setup

with open(os.path.join(os.getcwd(), "helper_mod.py")) as fh:
    fh.read()

setup(name="withhelper", version=helper_mod.VERSION)
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("clean parse");
    assert_eq!(metadata.get("version"), Some(&json!("9.9.9")));
    assert!(
        !dir.path().join("__pycache__").exists(),
        "parsing should leave no byte-code caches in the package"
    );
}

#[test]
fn class_valued_build_hooks_are_dropped() {
    let Some(python) = find_python() else {
        eprintln!("skipping trusted parse test (python with setuptools not found)");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let setup_py = write_setup(
        dir.path(),
        r#"from setuptools import setup


class CustomBuild(object):
    pass


setup(
    name="hooked",
    version="0.5.0",
    cmdclass={"build": CustomBuild},
    ext_modules=[],
    distclass=CustomBuild,
)
"#,
    );

    let metadata = parse_setup_with(
        &trusted_settings(&python),
        &trusted_request(&setup_py, false),
    )
    .expect("clean parse");
    assert_eq!(metadata.args().len(), 2);
    assert!(metadata.get("cmdclass").is_none());
    assert!(metadata.get("ext_modules").is_none());
    assert!(metadata.get("distclass").is_none());
}
