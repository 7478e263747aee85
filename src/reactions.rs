//! Keyword-triggered emoji reactions, applied concurrently.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::worker::Randomness;

/// Category a message falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Greeting,
    Positive,
    Love,
    Funny,
    Surprise,
    Sad,
    Angry,
    Celebration,
    Random,
}

/// A reaction chosen for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub emoji: &'static str,
}

/// Emoji counts, most frequent first.
pub type ReactionStats = Vec<(&'static str, u64)>;

/// Pool used when no trigger matches.
pub const RANDOM_POOL: [&str; 8] = ["👍", "👎", "❤️", "😂", "😮", "😢", "😡", "🎉"];

struct Trigger {
    kind: ReactionKind,
    emoji: &'static str,
    pattern: Regex,
}

const TRIGGER_WORDS: [(ReactionKind, &str, &[&str]); 8] = [
    (
        ReactionKind::Greeting,
        "👋",
        &["hello", "hi", "hey", "good morning", "good afternoon"],
    ),
    (
        ReactionKind::Positive,
        "👍",
        &["good", "great", "awesome", "amazing", "excellent", "fantastic"],
    ),
    (
        ReactionKind::Love,
        "❤️",
        &["love", "like", "adore", "enjoy", "favorite"],
    ),
    (
        ReactionKind::Funny,
        "😂",
        &["lol", "haha", "funny", "laugh", "hilarious", "comedy"],
    ),
    (
        ReactionKind::Surprise,
        "😮",
        &["wow", "omg", "incredible", "unbelievable", "shocking"],
    ),
    (
        ReactionKind::Sad,
        "😢",
        &["sad", "cry", "tears", "depressed", "upset", "disappointed"],
    ),
    (
        ReactionKind::Angry,
        "😡",
        &["angry", "mad", "furious", "annoyed", "irritated"],
    ),
    (
        ReactionKind::Celebration,
        "🎉",
        &["party", "celebrate", "congrats", "congratulations", "cheers"],
    ),
];

static TRIGGERS: LazyLock<Vec<Trigger>> = LazyLock::new(|| {
    TRIGGER_WORDS
        .iter()
        .map(|(kind, emoji, words)| {
            let alternatives = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            Trigger {
                kind: *kind,
                emoji: *emoji,
                pattern: Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
                    .expect("trigger pattern is valid"),
            }
        })
        .collect()
});

/// Chooses reactions for messages and keeps per-emoji counts.
pub struct ReactionEngine {
    rng: Arc<dyn Randomness>,
    delay: (Duration, Duration),
    counts: RwLock<HashMap<&'static str, u64>>,
}

impl ReactionEngine {
    pub fn new(rng: Arc<dyn Randomness>, delay: (Duration, Duration)) -> Self {
        Self {
            rng,
            delay,
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// One reaction per matching category, or one random emoji when nothing matches.
    pub fn choose(&self, text: &str) -> Vec<Reaction> {
        let matched: Vec<Reaction> = TRIGGERS
            .iter()
            .filter(|t| t.pattern.is_match(text))
            .map(|t| Reaction {
                kind: t.kind,
                emoji: t.emoji,
            })
            .collect();

        if !matched.is_empty() {
            return matched;
        }

        let pick = (self.rng.next_f64() * RANDOM_POOL.len() as f64) as usize;
        vec![Reaction {
            kind: ReactionKind::Random,
            emoji: RANDOM_POOL[pick.min(RANDOM_POOL.len() - 1)],
        }]
    }

    fn sample_delay(&self) -> Duration {
        let (min, max) = self.delay;
        if max <= min {
            return min;
        }
        min + (max - min).mul_f64(self.rng.next_f64())
    }

    /// Choose reactions for `text` and apply them concurrently.
    pub async fn react(&self, text: &str) -> Vec<Reaction> {
        let reactions = self.choose(text);

        join_all(reactions.iter().map(|reaction| {
            let delay = self.sample_delay();
            async move {
                tokio::time::sleep(delay).await;
                *self.counts.write().await.entry(reaction.emoji).or_insert(0) += 1;
            }
        }))
        .await;

        tracing::debug!(count = reactions.len(), "Applied reactions");
        reactions
    }

    pub async fn stats(&self) -> ReactionStats {
        let mut stats: ReactionStats = self
            .counts
            .read()
            .await
            .iter()
            .map(|(emoji, count)| (*emoji, *count))
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        stats
    }

    /// Total reactions applied.
    pub async fn total(&self) -> u64 {
        self.counts.read().await.values().sum()
    }
}
