//! Common Types and Constants
//!
//! Shared data structures used across all algorithm modules.

use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Milliseconds in one day
pub const DAY_MS: i64 = 86_400_000;

/// Ease factor assigned to a card that has never been reviewed
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// Lower bound of the ease factor
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Upper bound of any scheduled interval (100 years)
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

/// Interval from which a card counts as long-term memory
pub const MASTERY_INTERVAL_DAYS: i64 = 21;

/// Accuracy a card needs on top of the interval to count as mastered
pub const MASTERY_ACCURACY: f64 = 0.8;

/// Recall probability expected when a card comes due
pub const TARGET_RETENTION: f64 = 0.9;

// ==================== Scheduling Types ====================

/// Per-card scheduling counters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    /// Current interval in days (0 for a card never reviewed)
    pub interval_days: i64,
    /// SM-2 ease factor
    pub ease_factor: f64,
    /// Streak of consecutive correct answers
    pub repetitions: u32,
    /// Lifetime correct answers
    pub correct_count: u32,
    /// Lifetime incorrect answers
    pub incorrect_count: u32,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self {
            interval_days: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            repetitions: 0,
            correct_count: 0,
            incorrect_count: 0,
        }
    }
}

impl ReviewState {
    pub fn attempts(&self) -> u32 {
        self.correct_count.saturating_add(self.incorrect_count)
    }

    pub fn is_new(&self) -> bool {
        self.attempts() == 0
    }
}

/// Result of scheduling one review
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub state: ReviewState,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub next_review_ms: i64,
    pub correct: bool,
}

/// Interval a given quality would produce
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub quality: u8,
    pub interval_days: i64,
    pub ease_factor: f64,
}

// ==================== Analytics Types ====================

/// Snapshot of one reviewable item as analytics sees it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    pub item_id: String,
    pub topic: String,
    pub state: ReviewState,
    pub last_reviewed_ms: Option<i64>,
    pub next_review_ms: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Reviewing => "reviewing",
            Self::Mastered => "mastered",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeaknessReason {
    LowAccuracy,
    LowEase,
    Overdue,
    RepeatedLapses,
}

/// A card flagged by the weakness detector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weakness {
    pub item_id: String,
    pub topic: String,
    pub score: f64,
    pub accuracy: f64,
    pub ease_factor: f64,
    pub retention: f64,
    pub reasons: Vec<WeaknessReason>,
}

/// Tunables of the weakness detector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaknessConfig {
    /// Answers an item needs before it can be judged
    pub min_attempts: u32,
    /// Score from which an item is reported
    pub threshold: f64,
    pub error_weight: f64,
    pub ease_weight: f64,
    pub forgetting_weight: f64,
    /// Maximum number of weaknesses returned
    pub limit: usize,
}

impl Default for WeaknessConfig {
    fn default() -> Self {
        Self {
            min_attempts: 3,
            threshold: 0.45,
            error_weight: 0.5,
            ease_weight: 0.3,
            forgetting_weight: 0.2,
            limit: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub topic: String,
    pub items: usize,
    pub attempts: u64,
    pub accuracy: Option<f64>,
    pub mastered: usize,
    pub weak: usize,
    pub average_ease: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_items: usize,
    pub new_items: usize,
    pub learning_items: usize,
    pub reviewing_items: usize,
    pub mastered_items: usize,
    pub due_now: usize,
    pub overdue: usize,
    pub weak_items: usize,
    pub total_attempts: u64,
    pub accuracy: Option<f64>,
    pub average_ease: Option<f64>,
    pub average_retention: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakInfo {
    pub current: u32,
    pub longest: u32,
    pub active_today: bool,
}

// ==================== Practice Types ====================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeCandidate {
    pub item_id: String,
    /// Weakness score in [0, 1]
    pub weakness: f64,
    /// Milliseconds past due; negative when not yet due
    pub overdue_ms: i64,
}

impl PracticeCandidate {
    pub fn is_due(&self) -> bool {
        self.overdue_ms >= 0
    }
}
