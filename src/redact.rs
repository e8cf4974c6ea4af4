//! Redaction of sensitive fields before data crosses the crate boundary.

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Masks sensitive values in arbitrary JSON.
///
/// Implementations must be total (any `Value` in, a `Value` out) and
/// idempotent: redacting an already redacted value changes nothing.
pub trait Redactor: Send + Sync {
    fn redact(&self, value: &Value) -> Value;
}

/// Replaces the value of every object key whose normalized name contains one
/// of the configured patterns.
#[derive(Debug, Clone)]
pub struct KeyPatternRedactor {
    patterns: Vec<String>,
}

/// Credential token names are listed individually so counters such as
/// `maxTokens` or `totalTokens` are left alone.
const DEFAULT_PATTERNS: [&str; 13] = [
    "apikey",
    "authorization",
    "password",
    "secret",
    "cookie",
    "credential",
    "privatekey",
    "accesstoken",
    "refreshtoken",
    "idtoken",
    "bearertoken",
    "authtoken",
    "sessiontoken",
];

impl KeyPatternRedactor {
    pub fn new(patterns: &[&str]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| normalize_key(p)).collect(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.patterns.iter().any(|pattern| key.contains(pattern.as_str()))
    }
}

impl Default for KeyPatternRedactor {
    fn default() -> Self {
        Self::new(&DEFAULT_PATTERNS)
    }
}

impl Redactor for KeyPatternRedactor {
    fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| {
                        let redacted = if self.is_sensitive(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact(inner)
                        };
                        (key.clone(), redacted)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.redact(item)).collect()),
            other => other.clone(),
        }
    }
}

/// `api_key`, `Api-Key` and `apiKey` all normalize to `apikey`.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
