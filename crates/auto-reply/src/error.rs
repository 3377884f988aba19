pub type Result<T> = std::result::Result<T, Error>;

/// Failures while executing a command or voice note. Each one is turned into
/// a `❌` reply and an audit record; none of them stop the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bridge(#[from] relay_bridge::Error),

    #[error("media retrieval failed: {0}")]
    Media(#[source] relay_channels::Error),

    #[error("voice notes are not supported by this chat adapter")]
    MediaUnsupported,

    #[error("transcription was empty")]
    EmptyTranscript,

    /// The worker answered the transcription request with an error reply
    /// instead of a transcript.
    #[error("transcription failed: {0}")]
    Transcription(String),
}

impl Error {
    /// Short machine-readable kind for audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bridge(e) => e.kind(),
            Self::Media(_) | Self::MediaUnsupported => "media_failure",
            Self::EmptyTranscript => "empty_transcript",
            Self::Transcription(_) => "transcription_failure",
        }
    }

    /// Text shown to the user after the `❌` marker.
    pub fn detail(&self) -> String {
        match self {
            Self::Bridge(relay_bridge::Error::Timeout(d)) => {
                format!("Timed out after {d:?}")
            },
            Self::Bridge(relay_bridge::Error::Spawn { .. }) => {
                "Could not start the worker".to_string()
            },
            Self::Bridge(e) => e.detail(),
            Self::Transcription(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}
