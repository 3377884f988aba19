use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The worker executable could not be started.
    #[error("failed to start worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker timed out after {0:?}")]
    Timeout(Duration),

    /// The worker exited unsuccessfully. `code` is `None` when it was killed
    /// by a signal.
    #[error("worker exited with {}: {detail}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, detail: String },

    /// The worker exited cleanly but reported an error object.
    #[error("worker reported an error: {0}")]
    Worker(String),

    #[error("worker i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode bridge request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-readable kind for audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn_failure",
            Self::Timeout(_) => "timeout",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::Worker(_) => "worker_error",
            Self::Io(_) => "io",
            Self::Encode(_) => "encode",
        }
    }

    /// Human-readable detail without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::NonZeroExit { detail, .. } | Self::Worker(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
