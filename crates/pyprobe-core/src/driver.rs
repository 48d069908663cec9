//! The Python side of the tool: a recording harness materialized to a
//! scratch directory and handed to whatever interpreter runs the script.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ParseError;

pub(crate) const DRIVER_FILE_NAME: &str = "pyprobe_driver.py";

/// Intercepts `setup()` calls, executes the script, and emits the captured
/// arguments as a delimiter-framed envelope on stdout.
///
/// Kept runnable on CPython 2.7 because the legacy sandbox image re-runs it
/// there, so no f-strings and both import-finder protocols.
pub(crate) const DRIVER_SCRIPT: &str = r#"
"""Runs a setup.py build script and reports the arguments it passes to setup().

Companion script of the pyprobe executable, which writes it to a scratch
directory and hands it to the interpreter it selected. Everything the script
prints flows through to stdout untouched; after the delimiter comes exactly
one JSON document with the captured arguments.

Must stay runnable on CPython 2.7: the legacy sandbox image re-runs it there.
"""
import json
import os
import sys
import types

OUTPUT_DELIMITER = "\n{{ENDOUTPUT}}\n"

STUB_VERSION = "1.0.0"

DROPPED_KEYS = ("cmdclass", "ext_modules", "distclass")


class Stub(object):
    """Inert placeholder for anything an unresolvable import would provide."""

    def __init__(self, *args, **kwargs):
        pass

    def __getattr__(self, name):
        return self

    def __call__(self, *args, **kwargs):
        return self

    def __getitem__(self, key):
        return self

    def __setitem__(self, key, value):
        pass

    def __add__(self, other):
        return self

    def __iter__(self):
        return iter(())

    def __fspath__(self):
        return __file__

    def __repr__(self):
        return "<stub>"

    __str__ = __repr__


class StubModule(types.ModuleType):
    """Module-shaped stub.

    Every attribute is a Stub except the two names build scripts most often
    read off an imported module.
    """

    def __getattr__(self, name):
        if name == "__version__":
            return STUB_VERSION
        if name == "__file__":
            return __file__
        return Stub()


class StubImporter(object):
    """Manufactures stub modules for imports every real finder refused.

    Appended to the end of sys.meta_path so it never shadows a module that
    actually resolves. Implements find_spec for current interpreters and the
    legacy find_module protocol for 2.7.
    """

    def find_spec(self, fullname, path=None, target=None):
        from importlib.util import spec_from_loader
        return spec_from_loader(fullname, self, is_package=True)

    def create_module(self, spec):
        return StubModule(spec.name)

    def exec_module(self, module):
        pass

    def find_module(self, fullname, path=None):
        return self

    def load_module(self, fullname):
        module = StubModule(fullname)
        sys.modules[fullname] = module
        return module


def intercept_setup(recorder):
    """Points every known setup() entry point at the recorder.

    Returns (module, original) pairs so the caller can undo the patch.
    setuptools is mandatory; the distutils and numpy entry points are patched
    only when they import.
    """
    import setuptools
    modules = [setuptools]
    try:
        import distutils.core
        modules.append(distutils.core)
    except ImportError:
        pass
    try:
        import numpy.distutils.core
        modules.append(numpy.distutils.core)
    except Exception:
        pass
    originals = [(module, module.setup) for module in modules]
    for module in modules:
        module.setup = recorder
    return originals


def run_script(filename):
    source = open(filename, "rb").read()
    code = compile(source, filename, "exec")
    context = {
        "__name__": "__main__",
        "__file__": filename,
        "__builtins__": __builtins__,
    }
    exec(code, context)


def capture_setup_args(filename, mock_imports):
    """Executes the script and returns the kwargs of its last setup() call.

    The script runs as if invoked as "python setup.py install" from its own
    directory. If the first run dies with an ImportError and mock_imports is
    set, a stub importer joins the end of the resolver chain and the script
    runs once more; the importer is removed again no matter how that goes.
    """
    calls = []

    def recorder(**kwargs):
        calls.append(kwargs)

    originals = intercept_setup(recorder)

    package_dir = os.path.dirname(filename)
    old_cwd = os.getcwd()
    old_argv = sys.argv
    old_path = sys.path
    os.chdir(package_dir)
    sys.argv = [filename, "install"]
    sys.path = [package_dir] + sys.path
    # some scripts locate their sources through the __main__ module
    sys.modules["__main__"].__file__ = filename

    try:
        try:
            run_script(filename)
        except ImportError:
            if not mock_imports:
                raise
            importer = StubImporter()
            sys.meta_path.append(importer)
            try:
                run_script(filename)
            finally:
                sys.meta_path.remove(importer)
    finally:
        for module, original in originals:
            module.setup = original
        os.chdir(old_cwd)
        sys.argv = old_argv
        sys.path = old_path

    if not calls:
        raise ValueError("setup() was never called by " + filename)
    return calls[-1]


def encode_metadata(args):
    """Best-effort JSON rendering of the captured kwargs.

    Byte strings decode as UTF-8 with errors ignored; other values the
    encoder refuses flatten to lists when iterable and fall back to their
    string form otherwise. Class-valued build hooks carry no useful metadata
    and are dropped up front.
    """
    for key in DROPPED_KEYS:
        args.pop(key, None)

    def coerce(value):
        if isinstance(value, bytes):
            return value.decode("utf8", "ignore")
        try:
            return list(value)
        except TypeError:
            return str(value)

    return json.dumps(args, skipkeys=True, default=coerce, indent=2)


def main():
    import argparse

    parser = argparse.ArgumentParser(
        description="Capture the arguments a setup.py passes to setup()"
    )
    parser.add_argument(
        "--mockimports",
        action="store_true",
        help="substitute stub modules for imports that fail",
    )
    parser.add_argument("filename", help="path to the setup.py to run")
    options = parser.parse_args()

    filename = os.path.abspath(options.filename)
    args = capture_setup_args(filename, options.mockimports)

    sys.stdout.flush()
    sys.stdout.write(OUTPUT_DELIMITER)
    sys.stdout.write(encode_metadata(args))
    sys.stdout.write("\n")


if __name__ == "__main__":
    main()
"#;

/// Writes the driver into `dir` and returns its path.
pub(crate) fn stage_driver(dir: &Path) -> Result<PathBuf, ParseError> {
    let path = dir.join(DRIVER_FILE_NAME);
    fs::write(&path, DRIVER_SCRIPT).map_err(|source| ParseError::DriverStage { source })?;
    Ok(path)
}
