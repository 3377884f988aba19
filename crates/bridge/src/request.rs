use {serde::Serialize, std::collections::BTreeMap};

/// One structured request written to the worker's stdin.
///
/// Serialized as a flat JSON object: `{"command": "...", "<field>": "..."}`.
/// Field values are opaque; no escaping or interpretation happens here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeRequest {
    pub command: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl BridgeRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field. A field named `command` would shadow the command on the
    /// wire and is ignored.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != "command" {
            self.fields.insert(key, value.into());
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat() {
        let req = BridgeRequest::new("claude-code").field("prompt", "do X");
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"command":"claude-code","prompt":"do X"}"#);
    }

    #[test]
    fn command_field_cannot_be_overridden() {
        let req = BridgeRequest::new("status").field("command", "stop");
        assert!(req.fields.is_empty());
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"command":"status"}"#);
    }

    #[test]
    fn preserves_control_characters_and_unicode() {
        let prompt = "línea 1\nline 2\t\u{1b}[31m 🚀 \"quoted\" $(rm -rf /)";
        let req = BridgeRequest::new("claude-code").field("prompt", prompt);
        let value: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&req).unwrap()).unwrap();
        assert_eq!(value["prompt"].as_str(), Some(prompt));
    }
}
