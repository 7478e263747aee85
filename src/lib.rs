//! Parallel Reactions: concurrent task orchestration behind a chat bot.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reactions;
pub mod worker;
