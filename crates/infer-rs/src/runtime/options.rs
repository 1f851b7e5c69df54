use serde::{Deserialize, Serialize};

use super::error::RuntimeResult;
use crate::env;

const DEFAULT_BACKEND: &str = "cpu-ref";

/// Load-time settings for a [`LoadedNetwork`](super::LoadedNetwork).
///
/// Fields missing from a JSON document take their value from [`Default`], which reads
/// `INFERRS_BACKENDS` and `INFERRS_VALIDATE_MEMORY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Backend ids in the order assignment tries them.
    pub backend_preferences: Vec<String>,
    /// Refuse to execute while a bound input has never been written.
    pub validate_memory: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        let backend_preferences = env::backend_preferences()
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![DEFAULT_BACKEND.to_owned()]);
        Self {
            backend_preferences,
            validate_memory: env::validate_memory_enabled(),
        }
    }
}

impl NetworkOptions {
    pub fn with_backends<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend_preferences: backends.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> RuntimeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_override_defaults() {
        let options =
            NetworkOptions::from_json_str(r#"{"backend_preferences": ["faer", "cpu-ref"]}"#)
                .unwrap();
        assert_eq!(options.backend_preferences, vec!["faer", "cpu-ref"]);
        assert_eq!(options.validate_memory, NetworkOptions::default().validate_memory);

        let options = NetworkOptions::from_json_str(r#"{"validate_memory": false}"#).unwrap();
        assert!(!options.validate_memory);
        assert!(!options.backend_preferences.is_empty());
    }

    #[test]
    fn malformed_json_is_an_options_error() {
        let err = NetworkOptions::from_json_str(r#"{"validate_memory": "maybe"}"#).unwrap_err();
        assert!(matches!(err, crate::runtime::RuntimeError::Options(_)), "{err}");
    }
}
