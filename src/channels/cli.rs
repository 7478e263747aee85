//! CLI channel: stdin/stdout REPL for local runs.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Reads commands from stdin and prints replies to stdout.
pub struct CliChannel {
    user_id: String,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            user_id: "local-user".to_string(),
        }
    }

    /// Use a different identity for the local user.
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", &user_id, &line);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[tokio::test]
    async fn cli_respond_and_health() {
        let ch = CliChannel::with_user("tester");
        let msg = IncomingMessage::new("cli", "tester", "/status");
        assert!(ch.respond(&msg, OutgoingResponse::text("ok")).await.is_ok());
        assert!(ch.health_check().await.is_ok());
        assert!(ch.shutdown().await.is_ok());
    }
}
