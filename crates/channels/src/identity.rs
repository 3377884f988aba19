//! Canonical identifiers for chat participants and conversations.
//!
//! Multi-device accounts report several spellings of the same identity:
//! `4915112345678@c.us`, `4915112345678@s.whatsapp.net`,
//! `4915112345678:12@s.whatsapp.net` (device qualifier) and per-device
//! `@lid` aliases. Authorization compares bare ids only.

use relay_common::MessageEnvelope;

/// Suffixes stripped during normalization, longest first.
const KNOWN_SUFFIXES: &[&str] = &[
    "@s.whatsapp.net",
    "@broadcast",
    "@c.us",
    "@g.us",
    "@lid",
];

/// Suffix used by linked-device aliases.
const LINKED_DEVICE_SUFFIX: &str = "@lid";

/// Strip platform suffixes and device qualifiers from a raw identifier.
///
/// Unknown domains are left untouched so that they can never collide with a
/// bare id by accident.
pub fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    let Some(suffix) = KNOWN_SUFFIXES.iter().find(|s| raw.ends_with(**s)) else {
        return raw.to_string();
    };
    let bare = &raw[..raw.len() - suffix.len()];
    // `user:device` only appears on private-chat ids; group ids use `-`.
    let bare = match bare.split_once(':') {
        Some((user, _device)) => user,
        None => bare,
    };
    bare.to_string()
}

/// True when the identifier is a per-device alias rather than a real
/// conversation id.
pub fn is_linked_device_alias(raw: &str) -> bool {
    raw.trim().ends_with(LINKED_DEVICE_SUFFIX)
}

/// Canonical id of the conversation the envelope belongs to.
///
/// Always taken from the authoritative `conversation_id`. The originating id
/// is only consulted when the authoritative field is empty and the
/// originating id is not a linked-device alias; otherwise the result is empty
/// and will not match any policy.
pub fn canonical_conversation_id(envelope: &MessageEnvelope) -> String {
    if !envelope.conversation_id.trim().is_empty() {
        return normalize_id(&envelope.conversation_id);
    }
    if is_linked_device_alias(&envelope.originating_id) {
        return String::new();
    }
    normalize_id(&envelope.originating_id)
}

/// Canonical id of the individual author, if the client reported one.
pub fn canonical_sender_id(envelope: &MessageEnvelope) -> Option<String> {
    envelope
        .sender_id
        .as_deref()
        .map(normalize_id)
        .filter(|id| !id.is_empty())
}
