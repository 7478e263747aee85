//! Chat command parsing.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Run a batch; `None` uses the configured default size.
    Parallel { count: Option<usize> },
    Status,
    Stop,
    Reactions,
    Quit,
    /// A slash command with a malformed argument.
    Invalid { command: String, reason: String },
    /// A slash command the bot does not know.
    Unknown(String),
    /// Plain text, answered with reactions.
    Text(String),
}

impl Command {
    /// Parse message content into a command.
    pub fn parse(content: &str) -> Self {
        let trimmed = content.trim();
        if !trimmed.starts_with('/') {
            return Self::Text(trimmed.to_string());
        }

        let mut parts = trimmed.split_whitespace();
        let head = parts.next().unwrap_or_default().to_lowercase();
        // Telegram appends the bot name in groups: /status@SomeBot
        let name = head.split('@').next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name {
            "/start" => Self::Start,
            "/help" | "/?" => Self::Help,
            "/parallel" => parse_parallel(&args),
            "/status" => Self::Status,
            "/stop" => Self::Stop,
            "/reactions" => Self::Reactions,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// `/parallel [n]`
fn parse_parallel(args: &[&str]) -> Command {
    match args {
        [] => Command::Parallel { count: None },
        [raw] => match raw.parse::<usize>() {
            Ok(count) => Command::Parallel { count: Some(count) },
            Err(_) => Command::Invalid {
                command: "/parallel".into(),
                reason: format!("'{raw}' is not a whole number"),
            },
        },
        _ => Command::Invalid {
            command: "/parallel".into(),
            reason: "expected at most one argument".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/STATUS"), Command::Status);
        assert_eq!(Command::parse("  /stop  "), Command::Stop);
        assert_eq!(Command::parse("/reactions"), Command::Reactions);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/exit"), Command::Quit);
    }

    #[test]
    fn parse_parallel_sizes() {
        assert_eq!(Command::parse("/parallel"), Command::Parallel { count: None });
        assert_eq!(
            Command::parse("/parallel 12"),
            Command::Parallel { count: Some(12) }
        );
        assert_eq!(
            Command::parse("/parallel 0"),
            Command::Parallel { count: Some(0) }
        );
    }

    #[test]
    fn parse_parallel_rejects_garbage() {
        assert!(matches!(
            Command::parse("/parallel -3"),
            Command::Invalid { .. }
        ));
        assert!(matches!(
            Command::parse("/parallel five"),
            Command::Invalid { .. }
        ));
        assert!(matches!(
            Command::parse("/parallel 1 2"),
            Command::Invalid { .. }
        ));
    }

    #[test]
    fn parse_strips_bot_mention() {
        assert_eq!(Command::parse("/status@ReactionsBot"), Command::Status);
        assert_eq!(
            Command::parse("/parallel@ReactionsBot 3"),
            Command::Parallel { count: Some(3) }
        );
    }

    #[test]
    fn parse_unknown_and_text() {
        assert_eq!(Command::parse("/dance"), Command::Unknown("/dance".into()));
        assert_eq!(
            Command::parse("hello there"),
            Command::Text("hello there".into())
        );
    }
}
