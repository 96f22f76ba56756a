//! Error types for scene model operations.

use thiserror::Error;

/// Result type for scene model operations.
pub type CamlResult<T> = Result<T, CamlError>;

/// Errors that can occur while decoding or serializing a scene.
#[derive(Debug, Error)]
pub enum CamlError {
    /// A value matched none of its permitted shapes.
    #[error("Type mismatch for {what}: {found}")]
    TypeMismatch {
        /// The value family being decoded (e.g. `animation value`).
        what: &'static str,
        /// A short description of what was found instead.
        found: String,
    },

    /// A state name outside the closed state set.
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// A key path outside the closed key path set.
    #[error("Unknown key path: {0}")]
    UnknownKeyPath(String),

    /// A color string that is not a hex color.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// A markup fragment that could not be parsed.
    #[error("Malformed markup: {0}")]
    Markup(String),

    /// Project document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Value families decoded through [`CamlError::mismatch`].
pub(crate) const ANIMATION_VALUE: &str = "animation value";
pub(crate) const OVERRIDE_VALUE: &str = "override value";
const MISMATCH_FAMILIES: [&str; 2] = [ANIMATION_VALUE, OVERRIDE_VALUE];

/// Recovers [`CamlError::TypeMismatch`] from a union value that failed deep
/// inside a document; serde only carries the message across.
impl From<serde_json::Error> for CamlError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            let message = err.to_string();
            for what in MISMATCH_FAMILIES {
                let Some(rest) = message
                    .strip_prefix("Type mismatch for ")
                    .and_then(|m| m.strip_prefix(what))
                    .and_then(|m| m.strip_prefix(": "))
                else {
                    continue;
                };
                let found = rest.rsplit_once(" at line ").map_or(rest, |(found, _)| found);
                return Self::TypeMismatch {
                    what,
                    found: found.to_string(),
                };
            }
        }
        Self::Serialization(err)
    }
}

impl CamlError {
    /// Build a [`CamlError::TypeMismatch`] for a JSON value.
    pub(crate) fn mismatch(what: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null".to_string(),
            serde_json::Value::Bool(b) => format!("bool {b}"),
            serde_json::Value::Number(n) => format!("number {n}"),
            serde_json::Value::String(s) => format!("string {s:?}"),
            serde_json::Value::Array(a) => format!("array of {}", a.len()),
            serde_json::Value::Object(o) => {
                let keys: Vec<&str> = o.keys().map(String::as_str).collect();
                format!("object with keys [{}]", keys.join(", "))
            }
        };
        Self::TypeMismatch { what, found }
    }
}
