//! Outbound reply text.
//!
//! Every reply starts with a marker glyph from
//! [`relay_channels::dedup::REPLY_MARKERS`]; the relay relies on that to
//! recognize its own messages when they come back as inbound events.

use crate::command::Command;

/// Placeholder sent when the worker produced no text.
pub const EMPTY_PLACEHOLDER: &str = "(no response)";

/// Appended after the kept prefix of an over-long reply.
pub const TRUNCATION_MARKER: &str = "\n\n... (truncated)";

/// Bound `text` to `max_length` characters (Unicode scalar values).
pub fn format(text: &str, max_length: usize) -> String {
    if text.trim().is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Reply for a command the worker answered.
pub fn render(command: &Command, text: &str, max_length: usize) -> String {
    let body = format(text, max_length);
    match command {
        Command::Status => format!("📊 Status\n\n{body}"),
        Command::Sessions => format!("📋 Sessions\n\n{body}"),
        Command::ClaudeCode(_) => format!("🤖 {body}"),
        Command::Ask(_) => format!("💬 {body}"),
        Command::Stop => format!("🛑 {body}"),
        Command::Approve(_) => format!("✅ {body}"),
        Command::Continue => format!("▶️ {body}"),
        Command::Clear => format!("🧹 {body}"),
        Command::ChangeDir(_) | Command::Pwd => format!("📁 {body}"),
        Command::Help => format!("ℹ️ {body}"),
        Command::GroupId => format!("🆔 {body}"),
    }
}

/// Reply for a failed command or voice note.
pub fn render_error(detail: &str, max_length: usize) -> String {
    format!("❌ {}", format(detail, max_length))
}

/// Echo of what a voice note was heard as.
pub fn render_transcript(transcript: &str, max_length: usize) -> String {
    format!("🎤 Heard: {}", format(transcript, max_length))
}

/// Local answer to `/groupid`.
pub fn render_group_id(conversation_id: &str, is_group: bool) -> String {
    if is_group {
        format!("🆔 Group ID: {conversation_id}")
    } else {
        format!("🆔 Chat ID: {conversation_id} (not a group)")
    }
}

/// Local answer to `/help`.
pub fn help_text() -> String {
    let lines = [
        "ℹ️ Commands",
        "",
        "/status - session status",
        "/stop - interrupt the current task",
        "/cc <prompt> - send a prompt to Claude Code",
        "/ask <question> - ask the API directly",
        "/cd <path> - change the working directory",
        "/pwd - show the working directory",
        "/sessions - list sessions",
        "/clear - start a fresh session",
        "/groupid - show this chat's id",
        "/help - this message",
        "",
        "yes / no - answer an approval prompt",
        "continue - let the current task go on",
        "",
        "Anything else is sent to Claude Code. Voice notes are transcribed first.",
    ];
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        relay_channels::{dedup::REPLY_MARKERS, looks_self_generated},
        rstest::rstest,
    };

    #[test]
    fn short_text_unchanged() {
        assert_eq!(format("hello", 5), "hello");
        assert_eq!(format("hello", 3000), "hello");
    }

    #[test]
    fn long_text_truncated_with_marker() {
        let out = format("abcdefgh", 3);
        assert_eq!(out, format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(
            out.chars().count(),
            3 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(format("ñandú", 5), "ñandú");
        assert_eq!(format("🚀🚀🚀", 2), format!("🚀🚀{TRUNCATION_MARKER}"));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\n\t\n")]
    fn blank_becomes_placeholder(#[case] input: &str) {
        assert_eq!(format(input, 100), EMPTY_PLACEHOLDER);
    }

    #[test]
    fn status_header() {
        assert_eq!(render(&Command::Status, "ok", 3000), "📊 Status\n\nok");
    }

    #[test]
    fn header_added_after_truncation() {
        let out = render(&Command::ClaudeCode("x".into()), "abcdef", 2);
        assert_eq!(out, format!("🤖 ab{TRUNCATION_MARKER}"));
    }

    #[rstest]
    #[case(Command::Help)]
    #[case(Command::Status)]
    #[case(Command::Stop)]
    #[case(Command::GroupId)]
    #[case(Command::Approve(true))]
    #[case(Command::Continue)]
    #[case(Command::Clear)]
    #[case(Command::ChangeDir("/".into()))]
    #[case(Command::Pwd)]
    #[case(Command::Sessions)]
    #[case(Command::Ask("q".into()))]
    #[case(Command::ClaudeCode("p".into()))]
    fn every_reply_is_recognized_as_self_generated(#[case] command: Command) {
        assert!(looks_self_generated(&render(&command, "text", 100)));
    }

    #[test]
    fn local_and_error_replies_carry_markers() {
        for text in [
            render_error("boom", 100),
            render_transcript("hello", 100),
            render_group_id("120363", true),
            help_text(),
        ] {
            assert!(looks_self_generated(&text), "{text}");
        }
    }

    #[test]
    fn marker_set_matches_renderer() {
        let rendered: Vec<String> = [
            Command::Status,
            Command::Sessions,
            Command::ClaudeCode(String::new()),
            Command::Ask(String::new()),
            Command::Stop,
            Command::Approve(true),
            Command::Continue,
            Command::Clear,
            Command::Pwd,
            Command::Help,
            Command::GroupId,
        ]
        .iter()
        .map(|c| render(c, "x", 10))
        .chain([render_error("x", 10), render_transcript("x", 10)])
        .collect();
        for marker in REPLY_MARKERS {
            assert!(
                rendered.iter().any(|r| r.starts_with(marker)),
                "marker {marker} is never produced"
            );
        }
    }
}
