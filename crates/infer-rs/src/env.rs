use std::env;
use std::sync::OnceLock;

static INFERRS_BACKENDS: OnceLock<Option<Vec<String>>> = OnceLock::new();
static INFERRS_VALIDATE_MEMORY: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Backend preference order from `INFERRS_BACKENDS`, if set and non-empty.
pub(crate) fn backend_preferences() -> Option<&'static [String]> {
    INFERRS_BACKENDS
        .get_or_init(|| match env::var("INFERRS_BACKENDS") {
            Ok(value) => Some(parse_list(&value)).filter(|list| !list.is_empty()),
            Err(_) => None,
        })
        .as_deref()
}

pub(crate) fn validate_memory_enabled() -> bool {
    *INFERRS_VALIDATE_MEMORY.get_or_init(|| match env::var("INFERRS_VALIDATE_MEMORY") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => true,
    })
}
