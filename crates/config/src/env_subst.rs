//! `${VAR}` and `${VAR:-fallback}` expansion inside config string values.
//!
//! Expansion runs on the parsed value tree, so a substituted value can never
//! change the structure of the document.

/// Expand placeholders in every string of `value` using the process
/// environment.
pub fn substitute_value(value: &mut serde_json::Value) {
    substitute_value_with(value, &|name| std::env::var(name).ok());
}

/// Expand placeholders in every string of `value` using `lookup`.
pub fn substitute_value_with(value: &mut serde_json::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains("${") {
                *s = substitute_env_with(s, lookup);
            }
        },
        serde_json::Value::Array(items) => {
            for item in items {
                substitute_value_with(item, lookup);
            }
        },
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value_with(item, lookup);
            }
        },
        _ => {},
    }
}

/// Expand placeholders in a single string.
///
/// Unset variables without a fallback are left verbatim so the mistake is
/// visible in diagnostics.
pub fn substitute_env_with(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name).filter(|v| !v.is_empty()), fallback) {
            (false, Some(val), _) => out.push_str(&val),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
