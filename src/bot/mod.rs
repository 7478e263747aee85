//! Chat front end: parses commands, drives the orchestrator, replies.
//!
//! Every message is handled on its own tokio task, so a `/stop` sent while a
//! `/parallel` batch is running reaches the registry immediately.

pub mod commands;
pub mod format;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinSet;

pub use commands::Command;

use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::config::BotConfig;
use crate::error::{self, ChannelError};
use crate::orchestrator::Orchestrator;
use crate::reactions::ReactionEngine;
use crate::worker::BatchOptions;

/// Per-user chat session.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub started_at: DateTime<Utc>,
    pub reaction_count: u64,
    pub batches: u64,
}

impl UserSession {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            reaction_count: 0,
            batches: 0,
        }
    }
}

pub struct ReactionsBot {
    config: BotConfig,
    orchestrator: Orchestrator,
    reactions: Arc<ReactionEngine>,
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl ReactionsBot {
    pub fn new(
        config: BotConfig,
        orchestrator: Orchestrator,
        reactions: Arc<ReactionEngine>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            reactions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn session(&self, user_id: &str) -> Option<UserSession> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Run until Ctrl+C, `/quit` on the local console, or the channel ends.
    pub async fn run(self: Arc<Self>, channel: Arc<dyn Channel>) -> error::Result<()> {
        let mut messages = channel.start().await?;
        let mut in_flight = JoinSet::new();

        tracing::info!(
            bot = %self.config.name,
            channel = channel.name(),
            "Bot ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    }
                },
            };

            if channel.name() == "cli" && Command::parse(&message.content) == Command::Quit {
                let _ = channel
                    .respond(&message, OutgoingResponse::text("👋 Goodbye!"))
                    .await;
                tracing::info!("Shutdown command received, exiting...");
                break;
            }

            let bot = Arc::clone(&self);
            let channel = Arc::clone(&channel);
            in_flight.spawn(async move {
                if let Err(e) = bot.handle_message(channel.as_ref(), &message).await {
                    tracing::error!(
                        user_id = %message.user_id,
                        error = %e,
                        "Failed to answer message"
                    );
                }
            });

            // Reap finished handlers
            while in_flight.try_join_next().is_some() {}
        }

        // Running batches resolve as cancelled instead of running to completion
        for (user_id, _) in self.orchestrator.registry().active_users().await {
            self.orchestrator.cancel_all(&user_id).await;
        }
        while in_flight.join_next().await.is_some() {}

        channel.shutdown().await?;
        Ok(())
    }

    /// Handle one message and send every reply it produces.
    pub async fn handle_message(
        &self,
        channel: &dyn Channel,
        message: &IncomingMessage,
    ) -> Result<(), ChannelError> {
        let command = Command::parse(&message.content);
        let user_id = message.user_id.as_str();

        tracing::debug!(
            user_id,
            channel = %message.channel,
            ?command,
            "Received message"
        );

        let reply = match command {
            Command::Start => {
                self.sessions
                    .write()
                    .await
                    .insert(user_id.to_string(), UserSession::new());
                self.welcome()
            }
            Command::Help => self.welcome(),
            Command::Parallel { count } => {
                return self.run_parallel(channel, message, count).await;
            }
            Command::Status => self.status(user_id).await,
            Command::Stop => {
                let stopped = self.orchestrator.cancel_all(user_id).await;
                tracing::info!(user_id, stopped, "Stop requested");
                format::stopped(stopped)
            }
            Command::Reactions => format::reaction_stats(&self.reactions.stats().await),
            Command::Quit => "/quit is only available from the local console.".to_string(),
            Command::Invalid { command, reason } => format::invalid(&command, &reason),
            Command::Unknown(name) => format::unknown(&name),
            Command::Text(text) if text.is_empty() => return Ok(()),
            Command::Text(text) => self.react(user_id, &text).await,
        };

        channel
            .respond(message, OutgoingResponse::text(reply))
            .await
    }

    fn welcome(&self) -> String {
        let config = self.orchestrator.config();
        format::welcome(config.max_batch_size, config.default_batch_size)
    }

    async fn session_mut<T>(&self, user_id: &str, f: impl FnOnce(&mut UserSession) -> T) -> T {
        let mut sessions = self.sessions.write().await;
        f(sessions
            .entry(user_id.to_string())
            .or_insert_with(UserSession::new))
    }

    async fn run_parallel(
        &self,
        channel: &dyn Channel,
        message: &IncomingMessage,
        count: Option<usize>,
    ) -> Result<(), ChannelError> {
        let user_id = message.user_id.as_str();
        let config = self.orchestrator.config();
        let n = count.unwrap_or(config.default_batch_size);

        if (1..=config.max_batch_size).contains(&n) {
            channel
                .respond(message, OutgoingResponse::text(format::batch_started(n)))
                .await?;
        }

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let batch = self.orchestrator.run_batch_with(
            user_id,
            n,
            BatchOptions::default().with_progress(progress_tx),
        );
        // Ends once the batch drops its sender
        let progress = async {
            while let Some(report) = progress_rx.recv().await {
                channel
                    .respond(message, OutgoingResponse::text(format::unit_finished(&report)))
                    .await?;
            }
            Ok::<_, ChannelError>(())
        };
        let (outcome, progress) = tokio::join!(batch, progress);
        progress?;

        let reply = match outcome {
            Ok(result) => {
                self.session_mut(user_id, |s| s.batches += 1).await;
                format::batch_finished(&result)
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Batch rejected");
                format::batch_error(&e)
            }
        };

        channel
            .respond(message, OutgoingResponse::text(reply))
            .await
    }

    async fn status(&self, user_id: &str) -> String {
        let user = self.orchestrator.snapshot(Some(user_id)).await;
        let global = self.orchestrator.snapshot(None).await;
        let sessions = self.sessions.read().await;
        format::status(&user, &global, sessions.get(user_id), sessions.len())
    }

    async fn react(&self, user_id: &str, text: &str) -> String {
        let reactions = self.reactions.react(text).await;
        let added = reactions.len() as u64;
        self.session_mut(user_id, |s| s.reaction_count += added).await;

        let emojis: Vec<&str> = reactions.iter().map(|r| r.emoji).collect();
        format::reactions_added(&emojis)
    }
}
