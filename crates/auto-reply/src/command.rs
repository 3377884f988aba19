//! Mapping from message text to relay commands.

use relay_bridge::BridgeRequest;

/// A command the relay understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Stop,
    GroupId,
    Approve(bool),
    Continue,
    Clear,
    ChangeDir(String),
    Pwd,
    Sessions,
    /// One-shot question answered by the API, outside the coding session.
    Ask(String),
    /// Prompt forwarded to the coding session.
    ClaudeCode(String),
}

/// Parse message text into a command. Never fails: anything that is not a
/// known command is a prompt for the coding session.
pub fn parse(text: &str) -> Command {
    let text = text.trim();
    let (token, rest) = match text.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (text, ""),
    };

    let slash = match token.to_lowercase().as_str() {
        "/help" => Some(Command::Help),
        "/status" => Some(Command::Status),
        "/stop" => Some(Command::Stop),
        "/groupid" => Some(Command::GroupId),
        "/cd" => Some(Command::ChangeDir(rest.to_string())),
        "/pwd" => Some(Command::Pwd),
        "/sessions" => Some(Command::Sessions),
        "/clear" => Some(Command::Clear),
        "/cc" => Some(Command::ClaudeCode(rest.to_string())),
        "/ask" => Some(Command::Ask(rest.to_string())),
        _ => None,
    };
    if let Some(command) = slash {
        return command;
    }

    match text.to_lowercase().as_str() {
        "1" | "yes" | "approve" => Command::Approve(true),
        "2" | "no" | "reject" => Command::Approve(false),
        "continue" => Command::Continue,
        _ => Command::ClaudeCode(text.to_string()),
    }
}

impl Command {
    /// Stable name used in logs and audit records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Status => "status",
            Self::Stop => "stop",
            Self::GroupId => "group_id",
            Self::Approve(_) => "approve",
            Self::Continue => "continue",
            Self::Clear => "clear",
            Self::ChangeDir(_) => "cd",
            Self::Pwd => "pwd",
            Self::Sessions => "sessions",
            Self::Ask(_) => "ask",
            Self::ClaudeCode(_) => "claude_code",
        }
    }

    /// Free-text argument, if the command carries one.
    pub fn argument(&self) -> Option<&str> {
        match self {
            Self::ChangeDir(arg) | Self::Ask(arg) | Self::ClaudeCode(arg) => Some(arg),
            _ => None,
        }
    }

    /// The worker request for this command, or `None` for commands answered
    /// locally.
    pub fn bridge_request(&self) -> Option<BridgeRequest> {
        let request = match self {
            Self::Help | Self::GroupId => return None,
            Self::Status => BridgeRequest::new("status"),
            Self::Stop => BridgeRequest::new("stop"),
            Self::Approve(yes) => {
                BridgeRequest::new("approve").field("value", if *yes { "yes" } else { "no" })
            },
            Self::Continue => BridgeRequest::new("continue"),
            Self::Clear => BridgeRequest::new("clear"),
            Self::ChangeDir(path) => BridgeRequest::new("cd").field("path", path.as_str()),
            Self::Pwd => BridgeRequest::new("pwd"),
            Self::Sessions => BridgeRequest::new("sessions"),
            Self::Ask(prompt) => BridgeRequest::new("api").field("prompt", prompt.as_str()),
            Self::ClaudeCode(prompt) => {
                BridgeRequest::new("claude-code").field("prompt", prompt.as_str())
            },
        };
        Some(request)
    }
}

/// Worker request that transcribes a downloaded voice note.
pub fn transcribe_request(audio_path: &str) -> BridgeRequest {
    BridgeRequest::new("transcribe").field("audio_path", audio_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("/help", Command::Help)]
    #[case("  /help  ", Command::Help)]
    #[case("/HELP", Command::Help)]
    #[case("/status", Command::Status)]
    #[case("/Status now", Command::Status)]
    #[case("/stop", Command::Stop)]
    #[case("/groupid", Command::GroupId)]
    #[case("/pwd", Command::Pwd)]
    #[case("/sessions", Command::Sessions)]
    #[case("/clear", Command::Clear)]
    #[case("/cd ~/src/app", Command::ChangeDir("~/src/app".into()))]
    #[case("/cd", Command::ChangeDir(String::new()))]
    #[case("/cc do X", Command::ClaudeCode("do X".into()))]
    #[case("/CC   do X", Command::ClaudeCode("do X".into()))]
    #[case("/cc\ndo X", Command::ClaudeCode("do X".into()))]
    #[case("/ask what is rust", Command::Ask("what is rust".into()))]
    #[case("YES", Command::Approve(true))]
    #[case("1", Command::Approve(true))]
    #[case("approve", Command::Approve(true))]
    #[case("2", Command::Approve(false))]
    #[case("No", Command::Approve(false))]
    #[case("reject", Command::Approve(false))]
    #[case(" Continue ", Command::Continue)]
    fn parses_commands(#[case] input: &str, #[case] expected: Command) {
        assert_eq!(parse(input), expected);
    }

    #[rstest]
    #[case("fix the failing test")]
    #[case("yes please")]
    #[case("12")]
    #[case("/ccdo X")]
    #[case("/unknown arg")]
    #[case("résumé ✨ 日本語")]
    #[case("line one\nline two\n\tindented")]
    #[case("quotes \" and $(subshells) `ticks`")]
    fn everything_else_is_a_prompt(#[case] input: &str) {
        assert_eq!(parse(input), Command::ClaudeCode(input.to_string()));
    }

    #[test]
    fn prompt_is_trimmed_only_at_the_edges() {
        assert_eq!(
            parse("  keep  inner   spacing \n"),
            Command::ClaudeCode("keep  inner   spacing".into())
        );
    }

    #[test]
    fn empty_input_is_empty_prompt() {
        assert_eq!(parse(""), Command::ClaudeCode(String::new()));
        assert_eq!(parse("   "), Command::ClaudeCode(String::new()));
    }

    #[test]
    fn local_commands_have_no_request() {
        assert!(Command::Help.bridge_request().is_none());
        assert!(Command::GroupId.bridge_request().is_none());
    }

    #[rstest]
    #[case(Command::Status, r#"{"command":"status"}"#)]
    #[case(Command::Approve(true), r#"{"command":"approve","value":"yes"}"#)]
    #[case(Command::Approve(false), r#"{"command":"approve","value":"no"}"#)]
    #[case(Command::ChangeDir("/tmp".into()), r#"{"command":"cd","path":"/tmp"}"#)]
    #[case(Command::Ask("hi".into()), r#"{"command":"api","prompt":"hi"}"#)]
    #[case(Command::ClaudeCode("do X".into()), r#"{"command":"claude-code","prompt":"do X"}"#)]
    fn maps_to_worker_protocol(#[case] command: Command, #[case] wire: &str) {
        let request = command.bridge_request().unwrap();
        assert_eq!(serde_json::to_string(&request).unwrap(), wire);
    }

    #[test]
    fn transcribe_carries_path() {
        let request = transcribe_request("/tmp/voice.ogg");
        assert_eq!(request.command, "transcribe");
        assert_eq!(request.fields["audio_path"], "/tmp/voice.ogg");
    }
}
