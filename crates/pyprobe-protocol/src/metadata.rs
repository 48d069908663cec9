//! Captured `setup()` keyword arguments plus per-layer annotations.

use serde_json::{Map, Value};

/// Reserved key carrying text the script printed while executing.
pub const DIAGNOSTICS_KEY: &str = "stdout";

/// Reserved key carrying the primary-image error after a successful retry on
/// the legacy-interpreter image.
pub const FALLBACK_ERROR_KEY: &str = "python3_error";

/// The keyword arguments a `setup.py` passed to `setup()`.
///
/// The map holds exactly the captured keys; a clean capture of K arguments
/// renders as K keys. The two annotations live outside the map and appear in
/// rendered JSON only when set, under [`DIAGNOSTICS_KEY`] and
/// [`FALLBACK_ERROR_KEY`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetupMetadata {
    args: Map<String, Value>,
    diagnostics: Option<String>,
    fallback_error: Option<String>,
}

impl SetupMetadata {
    pub fn from_args(args: Map<String, Value>) -> Self {
        Self {
            args,
            diagnostics: None,
            fallback_error: None,
        }
    }

    /// The captured keyword arguments, exactly as the script passed them.
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Looks up one captured argument.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    pub fn diagnostics(&self) -> Option<&str> {
        self.diagnostics.as_deref()
    }

    pub fn set_diagnostics(&mut self, text: String) {
        self.diagnostics = Some(text);
    }

    pub fn fallback_error(&self) -> Option<&str> {
        self.fallback_error.as_deref()
    }

    pub fn set_fallback_error(&mut self, message: String) {
        self.fallback_error = Some(message);
    }

    /// Renders the full result: the argument map plus any annotations under
    /// their reserved keys.
    pub fn to_value(&self) -> Value {
        let mut rendered = self.args.clone();
        if let Some(diagnostics) = &self.diagnostics {
            rendered.insert(
                DIAGNOSTICS_KEY.to_string(),
                Value::String(diagnostics.clone()),
            );
        }
        if let Some(error) = &self.fallback_error {
            rendered.insert(FALLBACK_ERROR_KEY.to_string(), Value::String(error.clone()));
        }
        Value::Object(rendered)
    }

    /// Renders the argument map alone; the form that crosses layer
    /// boundaries, where each consumer derives its own annotations.
    pub fn args_value(&self) -> Value {
        Value::Object(self.args.clone())
    }
}

impl serde::Serialize for SetupMetadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}
