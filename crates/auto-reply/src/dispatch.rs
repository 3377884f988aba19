//! Per-message handling: loop suppression, authorization, voice
//! transcription, command execution, and the reply.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    relay_audit::{AuditEventKind, AuditLogger},
    relay_bridge::BridgeTransport,
    relay_channels::{
        AccessDenied, AuthPolicy, ChannelOutbound, DedupGuard, MediaFetcher, authorize,
        dedup::{DEFAULT_CAPACITY, REPLY_MARKERS},
        identity::canonical_sender_id,
        looks_self_generated,
    },
    relay_common::MessageEnvelope,
    tokio::{sync::mpsc, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    command::{Command, parse, transcribe_request},
    error::{Error, Result},
    reply,
};

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub command_timeout: Duration,
    pub transcribe_timeout: Duration,
    pub max_length: usize,
    pub dedup_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(300),
            transcribe_timeout: Duration::from_secs(120),
            max_length: 3000,
            dedup_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Why a message was dropped before authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OwnOutbound,
    AlreadyProcessed,
    QuotedReply,
    SelfGenerated,
}

/// What [`Dispatcher::handle`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Denied(AccessDenied),
    /// A command ran (or failed) and a reply was attempted.
    Handled {
        command: &'static str,
        success: bool,
    },
}

pub struct Dispatcher {
    policy: AuthPolicy,
    dedup: Mutex<DedupGuard>,
    bridge: Arc<dyn BridgeTransport>,
    outbound: Arc<dyn ChannelOutbound>,
    media: Option<Arc<dyn MediaFetcher>>,
    audit: AuditLogger,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        policy: AuthPolicy,
        bridge: Arc<dyn BridgeTransport>,
        outbound: Arc<dyn ChannelOutbound>,
        audit: AuditLogger,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            policy,
            dedup: Mutex::new(DedupGuard::new(settings.dedup_capacity)),
            bridge,
            outbound,
            media: None,
            audit,
            settings,
        }
    }

    /// Enable voice notes.
    #[must_use]
    pub fn with_media(mut self, media: Arc<dyn MediaFetcher>) -> Self {
        self.media = Some(media);
        self
    }

    /// Receive envelopes until the channel closes or `shutdown` is
    /// cancelled, handling each one in its own task. Returns once every
    /// in-flight handler has finished.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<MessageEnvelope>,
        shutdown: CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        loop {
            let envelope = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("shutdown requested, no longer accepting messages");
                    break;
                },
                envelope = rx.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => {
                        debug!("inbound channel closed");
                        break;
                    },
                },
            };
            let this = Arc::clone(&self);
            tasks.spawn(async move {
                this.handle(envelope).await;
            });
            while tasks.try_join_next().is_some() {}
        }
        debug!(in_flight = tasks.len(), "draining in-flight handlers");
        while tasks.join_next().await.is_some() {}
    }

    /// Handle one inbound message end to end.
    pub async fn handle(&self, envelope: MessageEnvelope) -> Outcome {
        if let Some(reason) = self.admit(&envelope) {
            debug!(message_id = %envelope.id, ?reason, "skipping message");
            return Outcome::Skipped(reason);
        }

        if let Err(denied) = authorize(&envelope, &self.policy) {
            info!(
                message_id = %envelope.id,
                reason = denied.code(),
                "message not authorized"
            );
            self.audit.record(AuditEventKind::AuthReject, [
                ("reason", denied.code().to_string()),
                ("message_id", envelope.id.clone()),
                ("conversation_id", envelope.conversation_id.clone()),
                ("sender_id", canonical_sender_id(&envelope).unwrap_or_default()),
                ("mode", self.policy.mode().to_string()),
            ]);
            return Outcome::Denied(denied);
        }

        if envelope.is_voice() {
            return self.handle_voice(&envelope).await;
        }
        let command = parse(&envelope.body_text);
        self.handle_command(&envelope, command).await
    }

    /// Dedup checks plus recording the inbound id, all under one lock and
    /// before the first suspension point.
    fn admit(&self, envelope: &MessageEnvelope) -> Option<SkipReason> {
        let mut dedup = match self.dedup.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if dedup.is_own_outbound(&envelope.id) {
            return Some(SkipReason::OwnOutbound);
        }
        if dedup.is_inbound_processed(&envelope.id) {
            return Some(SkipReason::AlreadyProcessed);
        }
        dedup.record_inbound(&envelope.id);
        drop(dedup);

        if envelope.is_quoted_reply {
            return Some(SkipReason::QuotedReply);
        }
        if looks_self_generated(&envelope.body_text) {
            return Some(SkipReason::SelfGenerated);
        }
        None
    }

    async fn handle_command(&self, envelope: &MessageEnvelope, command: Command) -> Outcome {
        let name = command.name();
        info!(message_id = %envelope.id, command = name, "command received");
        self.audit.record(AuditEventKind::CommandReceived, [
            ("command", name.to_string()),
            ("message_id", envelope.id.clone()),
            ("argument", command.argument().unwrap_or_default().to_string()),
        ]);

        let text = match self.execute(envelope, &command).await {
            Ok(text) => {
                self.audit.record(AuditEventKind::CommandSucceeded, [
                    ("command", name.to_string()),
                    ("message_id", envelope.id.clone()),
                ]);
                text
            },
            Err(e) => {
                warn!(message_id = %envelope.id, command = name, error = %e, "command failed");
                self.audit.record(AuditEventKind::CommandFailed, [
                    ("command", name.to_string()),
                    ("message_id", envelope.id.clone()),
                    ("error_kind", e.kind().to_string()),
                    ("detail", e.to_string()),
                ]);
                self.send_reply(
                    envelope,
                    &reply::render_error(&e.detail(), self.settings.max_length),
                )
                .await;
                return Outcome::Handled {
                    command: name,
                    success: false,
                };
            },
        };

        self.send_reply(envelope, &text).await;
        Outcome::Handled {
            command: name,
            success: true,
        }
    }

    /// Run a command and return the rendered reply.
    async fn execute(&self, envelope: &MessageEnvelope, command: &Command) -> Result<String> {
        let max = self.settings.max_length;
        match command {
            Command::Help => Ok(reply::help_text()),
            Command::GroupId => Ok(reply::render_group_id(
                &envelope.conversation_id,
                envelope.is_group_conversation,
            )),
            other => {
                let Some(request) = other.bridge_request() else {
                    return Ok(reply::render(other, "", max));
                };
                let text = self
                    .bridge
                    .call(request, self.settings.command_timeout)
                    .await?;
                Ok(reply::render(other, &text, max))
            },
        }
    }

    async fn handle_voice(&self, envelope: &MessageEnvelope) -> Outcome {
        info!(message_id = %envelope.id, "voice note received");
        self.audit.record(AuditEventKind::VoiceReceived, [
            ("message_id", envelope.id.clone()),
            (
                "media_kind",
                envelope
                    .media_kind
                    .map(|k| format!("{k:?}").to_lowercase())
                    .unwrap_or_default(),
            ),
        ]);

        let transcript = match self.transcribe(envelope).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(message_id = %envelope.id, error = %e, "voice note failed");
                self.audit.record(AuditEventKind::VoiceFailed, [
                    ("message_id", envelope.id.clone()),
                    ("error_kind", e.kind().to_string()),
                    ("detail", e.to_string()),
                ]);
                let text = format!("Voice note failed: {}", e.detail());
                self.send_reply(envelope, &reply::render_error(&text, self.settings.max_length))
                    .await;
                return Outcome::Handled {
                    command: "voice",
                    success: false,
                };
            },
        };

        self.audit.record(AuditEventKind::VoiceTranscribed, [
            ("message_id", envelope.id.clone()),
            ("transcript", transcript.clone()),
        ]);
        self.send_reply(
            envelope,
            &reply::render_transcript(&transcript, self.settings.max_length),
        )
        .await;

        let outcome = self.handle_command(envelope, parse(&transcript)).await;
        let kind = match outcome {
            Outcome::Handled { success: true, .. } => AuditEventKind::VoiceSucceeded,
            _ => AuditEventKind::VoiceFailed,
        };
        self.audit
            .record(kind, [("message_id", envelope.id.clone())]);
        outcome
    }

    async fn transcribe(&self, envelope: &MessageEnvelope) -> Result<String> {
        let media = self.media.as_ref().ok_or(Error::MediaUnsupported)?;
        let path = media
            .download_media(&envelope.id)
            .await
            .map_err(Error::Media)?;
        let result = self
            .bridge
            .call(
                transcribe_request(&path.to_string_lossy()),
                self.settings.transcribe_timeout,
            )
            .await;
        remove_download(&path).await;

        let transcript = result?.trim().to_string();
        if transcript.is_empty() {
            return Err(Error::EmptyTranscript);
        }
        // The worker reports its own failures as marked reply text with a
        // clean exit. Such text must never be run as a prompt.
        if looks_self_generated(&transcript) {
            return Err(Error::Transcription(strip_marker(&transcript).to_string()));
        }
        Ok(transcript)
    }

    /// Send a reply and remember its id. Failures are logged; replies are
    /// at-least-once and never retried here.
    async fn send_reply(&self, envelope: &MessageEnvelope, text: &str) -> Option<String> {
        let chat_id = reply_target(envelope);
        match self.outbound.send_text(chat_id, text).await {
            Ok(message_id) => {
                let mut dedup = match self.dedup.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                dedup.record_outbound(&message_id);
                Some(message_id)
            },
            Err(e) => {
                warn!(chat_id, error = %e, "failed to send reply");
                None
            },
        }
    }
}

/// Chat to answer in: the conversation the message arrived in.
fn reply_target(envelope: &MessageEnvelope) -> &str {
    if envelope.conversation_id.is_empty() {
        &envelope.originating_id
    } else {
        &envelope.conversation_id
    }
}

fn strip_marker(text: &str) -> &str {
    REPLY_MARKERS
        .iter()
        .find_map(|marker| text.strip_prefix(marker))
        .unwrap_or(text)
        .trim()
}

async fn remove_download(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "could not remove downloaded media");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn envelope(conversation_id: &str, originating_id: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: "m1".into(),
            conversation_id: conversation_id.into(),
            originating_id: originating_id.into(),
            sender_id: None,
            is_self_sent: true,
            is_group_conversation: false,
            body_text: String::new(),
            has_media: false,
            media_kind: None,
            is_quoted_reply: false,
        }
    }

    #[test]
    fn replies_go_to_the_conversation() {
        let env = envelope("123@s.whatsapp.net", "456@lid");
        assert_eq!(reply_target(&env), "123@s.whatsapp.net");
    }

    #[test]
    fn reply_falls_back_to_origin() {
        let env = envelope("", "123@s.whatsapp.net");
        assert_eq!(reply_target(&env), "123@s.whatsapp.net");
    }

    #[test]
    fn strips_leading_reply_marker() {
        assert_eq!(
            strip_marker("❌ Transcription failed: engine crashed"),
            "Transcription failed: engine crashed"
        );
        assert_eq!(strip_marker("plain words"), "plain words");
    }

    #[test]
    fn default_settings() {
        let s = DispatchSettings::default();
        assert_eq!(s.command_timeout, Duration::from_secs(300));
        assert_eq!(s.transcribe_timeout, Duration::from_secs(120));
        assert_eq!(s.max_length, 3000);
        assert_eq!(s.dedup_capacity, 1000);
    }
}
