/// Config schema types (auth, bridge worker, replies, dedup, audit, sidecar).
use std::{collections::BTreeMap, path::PathBuf};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub auth: AuthConfig,
    pub bridge: BridgeConfig,
    pub reply: ReplyConfig,
    pub dedup: DedupConfig,
    pub audit: AuditConfig,
    pub sidecar: SidecarConfig,
}

/// Who may drive the relay.
///
/// With no `group_id` only the account owner's own private chat is accepted.
/// With a `group_id`, messages inside that group are accepted, restricted to
/// `sender_id` when it is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

/// Worker process invoked once per command.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Executable to launch (looked up in `PATH` when relative).
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Deadline for a single command.
    pub timeout_secs: u64,
    /// Deadline for voice transcription.
    pub transcribe_timeout_secs: u64,
    /// Extra environment for the worker (API keys and the like).
    #[serde(serialize_with = "serialize_redacted_map")]
    pub env: BTreeMap<String, Secret<String>>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field("transcribe_timeout_secs", &self.transcribe_timeout_secs)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn serialize_redacted_map<S: serde::Serializer>(
    map: &BTreeMap<String, Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;

    let mut out = serializer.serialize_map(Some(map.len()))?;
    for key in map.keys() {
        out.serialize_entry(key, "[REDACTED]")?;
    }
    out.end()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["src/bridge.py".into()],
            working_dir: None,
            timeout_secs: 300,
            transcribe_timeout_secs: 120,
            env: BTreeMap::new(),
        }
    }
}

/// Outbound reply limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Maximum characters of worker output per reply, before the
    /// truncation marker.
    pub max_length: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self { max_length: 3000 }
    }
}

/// Loop-suppression memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Ids remembered per direction.
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Structured audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/audit.jsonl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Configured path, or the default under the data directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("audit.jsonl"))
    }
}

/// Chat-client sidecar process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Directory the sidecar runs in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Where the sidecar keeps its pairing credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_dir: Option<PathBuf>,
    /// How long to wait for the sidecar to acknowledge a send or download.
    pub ack_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            program: "node".into(),
            args: vec!["dist/index.js".into()],
            dir: None,
            auth_dir: None,
            ack_timeout_secs: 30,
        }
    }
}
