use relay_common::MessageEnvelope;

use crate::identity::{canonical_conversation_id, canonical_sender_id, normalize_id};

/// Who may drive the relay.
///
/// Built once from configuration at startup; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Only the account owner, writing to their own private chat.
    SelfChat,
    /// Messages inside one group, optionally from one sender only.
    GroupSender {
        group_id: String,
        sender_id: Option<String>,
    },
}

impl AuthPolicy {
    /// Build the group policy, normalizing configured ids the same way
    /// inbound ids are normalized. Blank sender ids mean "not configured".
    pub fn group_sender(group_id: &str, sender_id: Option<&str>) -> Self {
        Self::GroupSender {
            group_id: normalize_id(group_id),
            sender_id: sender_id.map(normalize_id).filter(|s| !s.is_empty()),
        }
    }

    /// Pick the policy from optional configured identifiers.
    pub fn from_ids(group_id: Option<&str>, sender_id: Option<&str>) -> Self {
        match group_id.map(str::trim).filter(|g| !g.is_empty()) {
            Some(group_id) => Self::group_sender(group_id, sender_id),
            None => Self::SelfChat,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::SelfChat => "self_chat",
            Self::GroupSender { .. } => "group_sender",
        }
    }
}

/// Determine if an inbound message may act.
///
/// Returns `Ok(())` if the message is allowed, or `Err(reason)` if it should
/// be silently dropped.
pub fn authorize(envelope: &MessageEnvelope, policy: &AuthPolicy) -> Result<(), AccessDenied> {
    match policy {
        AuthPolicy::SelfChat => {
            if envelope.is_group_conversation {
                return Err(AccessDenied::GroupWithoutPolicy);
            }
            if !envelope.is_self_sent {
                return Err(AccessDenied::NotSelf);
            }
            Ok(())
        },
        AuthPolicy::GroupSender {
            group_id,
            sender_id,
        } => {
            let conversation = canonical_conversation_id(envelope);
            if conversation.is_empty() || conversation != *group_id {
                return Err(AccessDenied::WrongGroup);
            }
            let Some(allowed) = sender_id else {
                return Ok(());
            };
            if envelope.is_self_sent {
                return Ok(());
            }
            match canonical_sender_id(envelope) {
                None => Err(AccessDenied::EmptySender),
                Some(sender) if sender == *allowed => Ok(()),
                Some(_) => Err(AccessDenied::WrongSender),
            }
        },
    }
}

/// Reason an inbound message was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    WrongGroup,
    WrongSender,
    EmptySender,
    NotSelf,
    GroupWithoutPolicy,
}

impl AccessDenied {
    /// Stable reason code recorded in the audit log.
    pub fn code(self) -> &'static str {
        match self {
            Self::WrongGroup => "wrong_group",
            Self::WrongSender => "wrong_sender",
            Self::EmptySender => "empty_sender",
            Self::NotSelf => "not_self",
            Self::GroupWithoutPolicy => "group_without_policy",
        }
    }
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongGroup => write!(f, "message is not from the configured group"),
            Self::WrongSender => write!(f, "sender is not the configured sender"),
            Self::EmptySender => write!(f, "sender id is missing"),
            Self::NotSelf => write!(f, "message was not sent by the account owner"),
            Self::GroupWithoutPolicy => write!(f, "group messages need a group policy"),
        }
    }
}
