//! Redaction and truncation of free-text audit fields.

use {regex::Regex, tracing::warn};

/// Replacement for anything that looks like a credential.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Maximum characters kept per field after redaction.
pub const MAX_FIELD_CHARS: usize = 500;

const TRUNCATION_SUFFIX: &str = "…";

/// Built-in patterns for common secret formats.
fn default_patterns() -> Vec<(&'static str, &'static str)> {
    vec![
        ("anthropic_key", r"sk-ant-[a-zA-Z0-9\-_]{20,}"),
        ("openai_key", r"sk-[a-zA-Z0-9\-_]{20,}"),
        ("github_token", r"gh[pousr]_[a-zA-Z0-9]{36,}"),
        ("github_pat", r"github_pat_[a-zA-Z0-9_]{22,}"),
        ("aws_access_key", r"AKIA[0-9A-Z]{16}"),
        ("bearer", r"(?i)bearer\s+[a-zA-Z0-9\-_.=+/]{16,}"),
        (
            "generic_api_key",
            r#"(?i)(api[_\-]?key|api[_\-]?secret|access[_\-]?token|auth[_\-]?token)\s*[:=]\s*['"]?[a-zA-Z0-9\-_.]{16,}['"]?"#,
        ),
        (
            "jwt",
            r"eyJ[a-zA-Z0-9_\-]+\.eyJ[a-zA-Z0-9_\-]+\.[a-zA-Z0-9_\-]+",
        ),
        (
            "private_key",
            r"-----BEGIN (?:RSA |EC |OPENSSH )?PRIVATE KEY-----",
        ),
    ]
}

/// Redacts secret-looking substrings and bounds field length.
pub struct Sanitizer {
    patterns: Vec<Regex>,
    max_chars: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::with_max_chars(MAX_FIELD_CHARS)
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        let patterns = default_patterns()
            .into_iter()
            .filter_map(|(name, pat)| match Regex::new(pat) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = name, error = %e, "skipping invalid redaction pattern");
                    None
                },
            })
            .collect();
        Self {
            patterns,
            max_chars,
        }
    }

    /// Redact, then truncate. Redaction runs first so a secret straddling
    /// the cut can never leave a readable prefix behind.
    pub fn sanitize(&self, text: &str) -> String {
        let mut clean = text.to_string();
        for re in &self.patterns {
            if re.is_match(&clean) {
                clean = re.replace_all(&clean, REDACTION_MARKER).into_owned();
            }
        }
        truncate_chars(&clean, self.max_chars)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_SUFFIX}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
