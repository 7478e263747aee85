//! Human-readable replies.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bot::UserSession;
use crate::error::BatchError;
use crate::worker::{BatchResult, MetricsSnapshot, UnitOutcome, UnitReport};

pub fn welcome(max_batch_size: usize, default_batch_size: usize) -> String {
    format!(
        "🚀 *Parallel Reactions Bot* 🚀\n\n\
         This bot runs simulated work in parallel and reacts to your messages.\n\n\
         *Commands:*\n\
         /start - Show this welcome message\n\
         /parallel [n] - Run n parallel tasks (default {default_batch_size}, max {max_batch_size})\n\
         /status - Your tasks and statistics\n\
         /stop - Stop all your active tasks\n\
         /reactions - Reaction statistics\n\n\
         Send any other text to get parallel reactions."
    )
}

pub fn batch_started(n: usize) -> String {
    format!("🔄 Starting {n} parallel tasks...\nEach task runs independently and reports back.")
}

/// One line per resolved unit, sent while the batch is still running.
pub fn unit_finished(report: &UnitReport) -> String {
    let task = report.index + 1;
    match report.outcome {
        UnitOutcome::Success => format!("⚡ Task {task} finished! ({})", seconds(report.elapsed)),
        UnitOutcome::Failure => format!("💥 Task {task} failed ({})", seconds(report.elapsed)),
        UnitOutcome::Cancelled => format!("🛑 Task {task} cancelled"),
        UnitOutcome::Pending => format!("⏳ Task {task} still running"),
    }
}

pub fn batch_finished(result: &BatchResult) -> String {
    let mut text = format!(
        "✅ Parallel processing complete!\n\
         Succeeded: {}/{}\n\
         Failed: {}\n\
         Cancelled: {}\n\
         Wall time: {}",
        result.succeeded,
        result.requested,
        result.failed,
        result.cancelled,
        seconds(result.elapsed),
    );
    if result.cancelled == result.requested {
        text = format!(
            "🛑 All {} tasks were cancelled after {}.",
            result.requested,
            seconds(result.elapsed)
        );
    }
    text
}

pub fn batch_error(err: &BatchError) -> String {
    match err {
        BatchError::InvalidBatchSize { requested, max } => {
            format!("❌ Cannot start {requested} tasks: choose a number from 1 to {max}.")
        }
        BatchError::DuplicateTask { .. } => {
            "❌ Internal error while starting tasks. Please try again.".to_string()
        }
    }
}

pub fn stopped(count: usize) -> String {
    if count == 0 {
        "ℹ️ No active tasks to stop.".to_string()
    } else {
        format!("🛑 Stopping {count} active tasks.")
    }
}

pub fn status(
    user: &MetricsSnapshot,
    global: &MetricsSnapshot,
    session: Option<&UserSession>,
    users: usize,
) -> String {
    let session_start = session
        .map(|s| timestamp(s.started_at))
        .unwrap_or_else(|| "N/A".to_string());
    let reactions = session.map_or(0, |s| s.reaction_count);

    format!(
        "🤖 *Bot Status*\n\n\
         *Your Session:*\n\
         • Active tasks: {}\n\
         • Batches: {}\n\
         • Succeeded/Failed/Cancelled: {}/{}/{}\n\
         • Success rate: {}\n\
         • Average task time: {}\n\
         • Throughput: {:.2} tasks/s\n\
         • Reactions: {}\n\
         • Session start: {}\n\n\
         *Global:*\n\
         • Users: {}\n\
         • Active tasks: {}\n\
         • Batches: {}\n\
         • Success rate: {}",
        user.active_tasks,
        user.batches,
        user.succeeded,
        user.failed,
        user.cancelled,
        percent(user.success_rate),
        seconds(user.average_duration),
        user.throughput,
        reactions,
        session_start,
        users,
        global.active_tasks,
        global.batches,
        percent(global.success_rate),
    )
}

pub fn reaction_stats(stats: &[(&str, u64)]) -> String {
    if stats.is_empty() {
        return "No reactions recorded yet. Send me a message!".to_string();
    }
    let mut text = "📊 *Reaction Statistics:*\n\n".to_string();
    for (emoji, count) in stats {
        text.push_str(&format!("{emoji} - {count} times\n"));
    }
    text
}

pub fn reactions_added(emojis: &[&str]) -> String {
    format!(
        "✨ Added {} parallel reactions: {}",
        emojis.len(),
        emojis.join(" ")
    )
}

pub fn unknown(command: &str) -> String {
    format!("🤔 Unknown command {command}. Try /start for the list of commands.")
}

pub fn invalid(command: &str, reason: &str) -> String {
    format!("❌ {command}: {reason}")
}

fn seconds(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn result(outcomes: &[UnitOutcome]) -> BatchResult {
        let units = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| UnitReport {
                task_id: i as u64,
                index: i,
                outcome: *outcome,
                planned: Duration::from_millis(100),
                elapsed: Duration::from_millis(100),
                completed_at: Utc::now(),
            })
            .collect();
        BatchResult::new(
            Uuid::new_v4(),
            "alice",
            outcomes.len(),
            Utc::now(),
            Duration::from_millis(1500),
            units,
        )
    }

    #[test]
    fn batch_summary_counts() {
        use UnitOutcome::*;
        let text = batch_finished(&result(&[Success, Success, Success, Success, Failure]));
        assert!(text.contains("Succeeded: 4/5"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("1.50s"));
    }

    #[test]
    fn fully_cancelled_batch() {
        let text = batch_finished(&result(&[UnitOutcome::Cancelled, UnitOutcome::Cancelled]));
        assert!(text.starts_with("🛑 All 2 tasks were cancelled"));
    }

    #[test]
    fn unit_progress_lines() {
        let mut report = result(&[UnitOutcome::Success]).units.remove(0);
        assert_eq!(unit_finished(&report), "⚡ Task 1 finished! (0.10s)");
        report.outcome = UnitOutcome::Failure;
        assert_eq!(unit_finished(&report), "💥 Task 1 failed (0.10s)");
        report.outcome = UnitOutcome::Cancelled;
        assert_eq!(unit_finished(&report), "🛑 Task 1 cancelled");
    }

    #[test]
    fn invalid_size_message() {
        let text = batch_error(&BatchError::InvalidBatchSize {
            requested: 99,
            max: 50,
        });
        assert_eq!(text, "❌ Cannot start 99 tasks: choose a number from 1 to 50.");
    }

    #[test]
    fn stop_messages() {
        assert_eq!(stopped(0), "ℹ️ No active tasks to stop.");
        assert_eq!(stopped(3), "🛑 Stopping 3 active tasks.");
    }

    #[test]
    fn status_without_session() {
        let user = MetricsSnapshot {
            success_rate: 0.75,
            ..Default::default()
        };
        let text = status(&user, &MetricsSnapshot::default(), None, 0);
        assert!(text.contains("Success rate: 75.0%"));
        assert!(text.contains("Session start: N/A"));
    }

    #[test]
    fn reaction_stats_listing() {
        assert!(reaction_stats(&[]).starts_with("No reactions"));
        let text = reaction_stats(&[("👍", 2), ("😮", 1)]);
        assert!(text.contains("👍 - 2 times\n😮 - 1 times"));
    }

    #[test]
    fn reactions_added_lists_emojis() {
        assert_eq!(
            reactions_added(&["👋", "👍"]),
            "✨ Added 2 parallel reactions: 👋 👍"
        );
    }
}
