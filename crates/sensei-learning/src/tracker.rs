//! Progress tracker: an [`EventSink`] that counts successful commands
//! per category, unlocks achievements, and persists everything to one
//! JSON file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use sensei_exec::{EventSink, TurnEvent, TurnOutcome};

use crate::achievements::{ACHIEVEMENTS, Achievement};
use crate::category::{ALL_CATEGORIES, Category};

const HISTORY_CAP: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub at: DateTime<Utc>,
    pub outcome: TurnOutcome,
}

/// Serializable tracker state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub categories: BTreeMap<Category, u64>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub unlocked: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Progress {
    /// Render the progress panel: one bar per category (10 successful
    /// commands = 100%), totals, and the achievement list.
    #[must_use]
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push("Learning Progress".to_string());

        let mut sorted: Vec<(Category, u64)> = ALL_CATEGORIES
            .iter()
            .map(|&category| (category, self.categories.get(&category).copied().unwrap_or(0)))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        for (category, count) in sorted {
            let pct = (count * 10).min(100);
            #[allow(clippy::cast_possible_truncation)]
            let full = (pct / 5) as usize;
            let bar: String = "█".repeat(full) + &"░".repeat(20 - full);
            lines.push(format!("  {:<14} {bar} {pct:>3}%", category.label()));
        }
        lines.push(format!("  Total commands run: {}", self.total));
        lines.push(String::new());

        lines.push(format!(
            "Achievements ({}/{})",
            self.unlocked.len(),
            ACHIEVEMENTS.len()
        ));
        for achievement in ACHIEVEMENTS {
            let mark = if self.unlocked.iter().any(|id| id == achievement.id) {
                "✔"
            } else {
                "🔒"
            };
            lines.push(format!(
                "  {mark} {} {}  -  {}",
                achievement.icon, achievement.name, achievement.description
            ));
        }
        lines
    }
}

struct TrackerState {
    progress: Progress,
    newly_unlocked: Vec<&'static Achievement>,
}

/// Event sink backed by `~/.sensei/progress.json`.
///
/// Persistence is best-effort: a failed write is logged and the
/// in-memory state keeps going.
pub struct Tracker {
    path: PathBuf,
    state: Mutex<TrackerState>,
}

impl Tracker {
    /// Load existing progress from `path`, or start fresh if the file
    /// is absent or corrupt.
    pub async fn load(path: PathBuf) -> Self {
        let progress = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(progress) => progress,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "progress file corrupt, starting fresh");
                    Progress::default()
                }
            },
            Err(_) => Progress::default(),
        };
        Self {
            path,
            state: Mutex::new(TrackerState {
                progress,
                newly_unlocked: Vec::new(),
            }),
        }
    }

    /// Achievements unlocked since the last call, in unlock order.
    pub async fn take_unlocked(&self) -> Vec<&'static Achievement> {
        std::mem::take(&mut self.state.lock().await.newly_unlocked)
    }

    pub async fn progress(&self) -> Progress {
        self.state.lock().await.progress.clone()
    }

    async fn persist(&self, progress: &Progress) {
        let json = match serde_json::to_string_pretty(progress) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(%err, "failed to serialize progress");
                return;
            }
        };
        if let Some(parent) = self.path.parent()
            && let Err(err) = tokio::fs::create_dir_all(parent).await
        {
            tracing::error!(%err, "failed to create progress directory");
            return;
        }
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        if let Err(err) = tokio::fs::write(&tmp, json).await {
            tracing::error!(%err, "failed to write progress file");
            return;
        }
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            tracing::error!(%err, "failed to replace progress file");
        }
    }
}

impl EventSink for Tracker {
    async fn record(&self, event: &TurnEvent) {
        let mut state = self.state.lock().await;

        if event.outcome == TurnOutcome::Succeeded {
            if let Some(category) = Category::of_command(&event.command) {
                *state.progress.categories.entry(category).or_insert(0) += 1;
            }
            state.progress.total += 1;
        }

        state.progress.history.push(HistoryEntry {
            command: event.command.clone(),
            at: Utc::now(),
            outcome: event.outcome,
        });
        let overflow = state.progress.history.len().saturating_sub(HISTORY_CAP);
        if overflow > 0 {
            state.progress.history.drain(..overflow);
        }

        for achievement in ACHIEVEMENTS {
            let already = state
                .progress
                .unlocked
                .iter()
                .any(|id| id == achievement.id);
            if !already
                && achievement.unlocked_by(&state.progress.categories, state.progress.total)
            {
                state.progress.unlocked.push(achievement.id.to_string());
                state.newly_unlocked.push(achievement);
                tracing::info!(achievement = achievement.id, "achievement unlocked");
            }
        }

        let snapshot = state.progress.clone();
        drop(state);
        self.persist(&snapshot).await;
    }
}
