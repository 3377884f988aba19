//! Inbound message envelope shared by the chat adapter and the dispatcher.

use serde::{Deserialize, Serialize};

/// Kind of media attached to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Push-to-talk voice note.
    Ptt,
    Audio,
    Image,
    Video,
    Document,
    Sticker,
    #[serde(other)]
    Other,
}

impl MediaKind {
    /// Voice notes and plain audio both go through transcription.
    pub fn is_voice(self) -> bool {
        matches!(self, Self::Ptt | Self::Audio)
    }
}

/// A single inbound chat event as reported by the chat client.
///
/// `conversation_id` is the authoritative thread id. `originating_id` is
/// whatever the client reports as "from", which on multi-device accounts can
/// be a per-device alias and must not be used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub originating_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub is_self_sent: bool,
    #[serde(default)]
    pub is_group_conversation: bool,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub is_quoted_reply: bool,
}

impl MessageEnvelope {
    /// True when the envelope carries a voice note or audio clip.
    pub fn is_voice(&self) -> bool {
        self.has_media && self.media_kind.is_some_and(MediaKind::is_voice)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn deserialize_minimal_envelope() {
        let json = r#"{"id": "ABC", "conversationId": "123@c.us"}"#;
        let env: MessageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.id, "ABC");
        assert_eq!(env.conversation_id, "123@c.us");
        assert!(env.sender_id.is_none());
        assert!(!env.is_self_sent);
        assert!(!env.is_group_conversation);
        assert!(env.body_text.is_empty());
        assert!(!env.is_voice());
    }

    #[test]
    fn deserialize_full_envelope() {
        let json = r#"{
            "id": "3EB0",
            "conversationId": "120363@g.us",
            "originatingId": "98765@lid",
            "senderId": "4915112345678@c.us",
            "isSelfSent": false,
            "isGroupConversation": true,
            "bodyText": "/status",
            "hasMedia": true,
            "mediaKind": "ptt",
            "isQuotedReply": true
        }"#;
        let env: MessageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.originating_id, "98765@lid");
        assert_eq!(env.sender_id.as_deref(), Some("4915112345678@c.us"));
        assert!(env.is_group_conversation);
        assert!(env.is_quoted_reply);
        assert_eq!(env.media_kind, Some(MediaKind::Ptt));
        assert!(env.is_voice());
    }

    #[rstest]
    #[case("\"ptt\"", MediaKind::Ptt, true)]
    #[case("\"audio\"", MediaKind::Audio, true)]
    #[case("\"image\"", MediaKind::Image, false)]
    #[case("\"location\"", MediaKind::Other, false)]
    fn media_kind_parsing(#[case] raw: &str, #[case] kind: MediaKind, #[case] voice: bool) {
        let parsed: MediaKind = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, kind);
        assert_eq!(parsed.is_voice(), voice);
    }

    #[test]
    fn voice_kind_without_media_flag_is_not_voice() {
        let env = MessageEnvelope {
            id: "1".into(),
            conversation_id: "1@c.us".into(),
            originating_id: String::new(),
            sender_id: None,
            is_self_sent: true,
            is_group_conversation: false,
            body_text: String::new(),
            has_media: false,
            media_kind: Some(MediaKind::Audio),
            is_quoted_reply: false,
        };
        assert!(!env.is_voice());
    }
}
