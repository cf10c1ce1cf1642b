use serde_json::Value as JsonValue;

/// Placeholder written over redacted values.
pub const REDACTED: &str = "[REDACTED]";

const DEFAULT_KEYS: &[&str] = &[
    "password",
    "passwd",
    "senha",
    "token",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "private_key",
    "pin_code",
    "card_number",
    "cvv",
];

/// Replaces the value of any field whose name contains a sensitive key.
///
/// Matching is case-insensitive and applies at every depth, inside objects
/// and arrays alike. Redacting twice gives the same result as redacting once.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::with_keys(DEFAULT_KEYS.iter().copied())
    }
}

impl Redactor {
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        let field = field.to_lowercase();
        self.keys.iter().any(|k| field.contains(k.as_str()))
    }

    pub fn redact(&self, value: &JsonValue) -> JsonValue {
        let mut out = value.clone();
        self.redact_in_place(&mut out);
        out
    }

    pub fn redact_in_place(&self, value: &mut JsonValue) {
        match value {
            JsonValue::Object(map) => {
                for (key, v) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        *v = JsonValue::String(REDACTED.to_string());
                    } else {
                        self.redact_in_place(v);
                    }
                }
            }
            JsonValue::Array(items) => {
                for v in items {
                    self.redact_in_place(v);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn redacts_nested_fields_and_keeps_the_rest() {
        let r = Redactor::default();
        let out = r.redact(&json!({"password": "x", "nested": {"token": "y", "keep": "z"}}));
        assert_eq!(
            out,
            json!({"password": REDACTED, "nested": {"token": REDACTED, "keep": "z"}})
        );
        assert_eq!(r.redact(&out), out);
    }

    #[test]
    fn matching_is_case_insensitive_and_substring_based() {
        let r = Redactor::default();
        let out = r.redact(&json!({
            "Senha": "1234",
            "refreshToken": "abc",
            "guardians": [{"name": "Maria", "API_KEY": "k"}],
        }));
        assert_eq!(out["Senha"], REDACTED);
        assert_eq!(out["refreshToken"], REDACTED);
        assert_eq!(out["guardians"][0]["API_KEY"], REDACTED);
        assert_eq!(out["guardians"][0]["name"], "Maria");
    }

    #[test]
    fn whole_subtree_under_a_sensitive_key_is_replaced() {
        let out = Redactor::default().redact(&json!({"secret": {"a": 1}}));
        assert_eq!(out, json!({"secret": REDACTED}));
    }

    #[test]
    fn scalars_pass_through() {
        let r = Redactor::default();
        assert_eq!(r.redact(&json!("password")), json!("password"));
        assert_eq!(r.redact(&JsonValue::Null), JsonValue::Null);
    }
}
