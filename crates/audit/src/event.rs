use {
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    ServiceStart,
    ServiceStop,
    AuthReject,
    CommandReceived,
    CommandSucceeded,
    CommandFailed,
    VoiceReceived,
    VoiceTranscribed,
    VoiceSucceeded,
    VoiceFailed,
}

impl AuditEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceStart => "service_start",
            Self::ServiceStop => "service_stop",
            Self::AuthReject => "auth_reject",
            Self::CommandReceived => "command_received",
            Self::CommandSucceeded => "command_succeeded",
            Self::CommandFailed => "command_failed",
            Self::VoiceReceived => "voice_received",
            Self::VoiceTranscribed => "voice_transcribed",
            Self::VoiceSucceeded => "voice_succeeded",
            Self::VoiceFailed => "voice_failed",
        }
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub kind: AuditEventKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn now(kind: AuditEventKind, fields: BTreeMap<String, String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind,
            fields,
        }
    }
}
