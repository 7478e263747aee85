use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use parallel_reactions::bot::ReactionsBot;
use parallel_reactions::channels::{Channel, CliChannel, TelegramChannel};
use parallel_reactions::config::{BotConfig, OrchestratorConfig};
use parallel_reactions::orchestrator::Orchestrator;
use parallel_reactions::reactions::ReactionEngine;
use parallel_reactions::worker::SeededRandomness;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Daily log files when PRA_LOG_DIR is set; the guard flushes on exit
    let (file_layer, _log_guard) = match std::env::var("PRA_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "parallel-reactions.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    let orchestrator_config =
        OrchestratorConfig::from_env().context("invalid orchestrator configuration")?;
    let bot_config = BotConfig::from_env();

    eprintln!("⚡ Parallel Reactions v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Batches: default {}, max {}",
        orchestrator_config.default_batch_size, orchestrator_config.max_batch_size
    );

    let reactions = Arc::new(ReactionEngine::new(
        Arc::new(SeededRandomness::from_seed(orchestrator_config.seed)),
        bot_config.reaction_delay,
    ));
    let orchestrator = Orchestrator::new(orchestrator_config)?;

    let channel: Arc<dyn Channel> = match &bot_config.telegram_token {
        Some(token) => {
            let telegram = TelegramChannel::new(token.clone(), bot_config.allowed_users.clone());
            telegram
                .health_check()
                .await
                .context("Telegram bot token rejected")?;
            eprintln!("   Channel: Telegram");
            Arc::new(telegram)
        }
        None => {
            eprintln!("   Channel: CLI (set TELEGRAM_BOT_TOKEN for Telegram)");
            eprintln!("   Type /start for help, /quit to exit.\n");
            Arc::new(CliChannel::new())
        }
    };

    let bot = Arc::new(ReactionsBot::new(bot_config, orchestrator, reactions));
    bot.run(channel).await?;

    Ok(())
}
