//! Telegram channel: long-polls the Bot API for updates.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Send a text message, splitting it to fit Telegram's limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Markdown first; plain text if Telegram rejects the markup.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_status = self
            .post_message(serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown"
            }))
            .await?;
        if markdown_status.is_success() {
            return Ok(());
        }

        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_status = self
            .post_message(serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .await?;
        if !plain_status.is_success() {
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_status})"
                ),
            });
        }
        Ok(())
    }

    async fn post_message(&self, body: Value) -> Result<reqwest::StatusCode, ChannelError> {
        self.client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map(|resp| resp.status())
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let data: Value = match client.post(&url).json(&body).send().await {
                    Ok(resp) => match resp.json().await {
                        Ok(data) => data,
                        Err(e) => {
                            tracing::warn!("Telegram parse error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let Some(updates) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in updates {
                    if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                        offset = update_id + 1;
                    }
                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// Check if any identity matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Turn one getUpdates entry into an [`IncomingMessage`].
///
/// Returns `None` for non-text updates and senders outside the allowlist.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from");

    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            username,
            user_id = user_id.as_deref().unwrap_or("unknown"),
            "Telegram: ignoring message from unauthorized user"
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    let display_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .unwrap_or(username);

    Some(
        IncomingMessage::new("telegram", user_id.as_deref().unwrap_or(username), text)
            .with_metadata(serde_json::json!({
                "chat_id": chat_id,
                "username": username,
            }))
            .with_user_name(display_name),
    )
}

/// Split a message into chunks of at most `max_len` bytes.
/// Prefers newlines, then spaces, and never cuts inside a character.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &remaining[..limit];
        let split_at = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(0) | None => limit,
            Some(pos) => pos,
        };
        // A single character wider than max_len
        let split_at = if split_at == 0 {
            remaining.chars().next().map_or(1, char::len_utf8)
        } else {
            split_at
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC".to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn update(text: &str, username: &str, id: i64) -> Value {
        serde_json::json!({
            "update_id": 10,
            "message": {
                "text": text,
                "from": {"id": id, "username": username, "first_name": "Ann"},
                "chat": {"id": 555}
            }
        })
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(&[]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn telegram_user_allowlist() {
        assert!(channel(&["*"]).is_user_allowed("anyone"));
        let ch = channel(&["alice", "42"]);
        assert!(ch.is_user_allowed("alice"));
        assert!(ch.is_user_allowed("42"));
        assert!(!ch.is_user_allowed("malice"));
        assert!(!ch.is_user_allowed(""));
        assert!(!channel(&[]).is_user_allowed("alice"));
    }

    #[test]
    fn parse_update_allowed_user() {
        let msg = parse_update(&update("/parallel 3", "alice", 42), &["alice".into()]).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "/parallel 3");
        assert_eq!(msg.metadata["chat_id"], "555");
        assert_eq!(msg.user_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn parse_update_by_numeric_id() {
        assert!(parse_update(&update("hi", "bob", 42), &["42".into()]).is_some());
    }

    #[test]
    fn parse_update_rejects_unknown_user() {
        assert!(parse_update(&update("hi", "eve", 7), &["alice".into()]).is_none());
    }

    #[test]
    fn parse_update_skips_non_text() {
        let update = serde_json::json!({"update_id": 1, "message": {"sticker": {}}});
        assert!(parse_update(&update, &["*".into()]).is_none());
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("hello", 100), vec!["hello"]);
    }

    #[test]
    fn split_message_on_newline() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn split_message_on_space() {
        let chunks = split_message("aaaa bbbb cccc", 10);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn split_message_hard_cut() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let text = "🎉".repeat(5); // 4 bytes each
        let chunks = split_message(&text, 6);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.len() <= 6));
    }
}
