//! SM-2 Review Scheduler
//!
//! Simplified SuperMemo-2. Each review takes the prior interval, ease
//! factor and answer counters plus an answer quality and produces the next
//! interval, ease factor and due date.
//!
//! Quality ratings (0-5):
//! - 0: no recall at all
//! - 1: incorrect, recognised the answer once shown
//! - 2: incorrect, answer felt familiar
//! - 3: correct with serious difficulty
//! - 4: correct after hesitation
//! - 5: perfect recall
//!
//! Answers rated 3 or above count as correct.

use serde::{Deserialize, Serialize};

use crate::sanitize::{sanitize_ease_factor, sanitize_state};
use crate::types::{
    IntervalPreview, ReviewOutcome, ReviewState, DAY_MS, MAX_INTERVAL_DAYS, MIN_EASE_FACTOR,
};

/// Lowest quality that still counts as a correct answer
pub const PASSING_QUALITY: u8 = 3;

pub const MAX_QUALITY: u8 = 5;

const FAST_RESPONSE_MS: i64 = 4_000;
const SLOW_RESPONSE_MS: i64 = 12_000;

/// Answer quality, always within 0..=5
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub fn new(raw: i64) -> Self {
        Self(raw.clamp(0, MAX_QUALITY as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_correct(self) -> bool {
        self.0 >= PASSING_QUALITY
    }

    /// Derive a quality when the client only reports correctness.
    pub fn from_answer(is_correct: bool, response_time_ms: Option<i64>) -> Self {
        match (is_correct, response_time_ms) {
            (false, None) => Self(0),
            (false, Some(_)) => Self(1),
            (true, None) => Self(4),
            (true, Some(ms)) if ms < FAST_RESPONSE_MS => Self(5),
            (true, Some(ms)) if ms < SLOW_RESPONSE_MS => Self(4),
            (true, Some(_)) => Self(3),
        }
    }

    pub fn all() -> impl Iterator<Item = Quality> {
        (0..=MAX_QUALITY).map(Quality)
    }
}

impl From<i64> for Quality {
    fn from(raw: i64) -> Self {
        Self::new(raw)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`, floored at 1.3
pub fn next_ease_factor(ease_factor: f64, quality: Quality) -> f64 {
    let ease = sanitize_ease_factor(ease_factor);
    let miss = (MAX_QUALITY - quality.value()) as f64;
    (ease + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR)
}

pub fn schedule(state: &ReviewState, quality: Quality, now_ms: i64) -> ReviewOutcome {
    let prior = sanitize_state(state);
    let correct = quality.is_correct();
    let mut next = prior;

    let interval_days = if correct {
        next.correct_count = prior.correct_count.saturating_add(1);
        next.repetitions = prior.repetitions.saturating_add(1);
        let interval = match prior.repetitions {
            0 => 1,
            1 => 6,
            _ => grow_interval(prior.interval_days, prior.ease_factor),
        };
        interval.max(prior.interval_days)
    } else {
        next.incorrect_count = prior.incorrect_count.saturating_add(1);
        next.repetitions = 0;
        1
    }
    .clamp(1, MAX_INTERVAL_DAYS);

    next.interval_days = interval_days;
    next.ease_factor = next_ease_factor(prior.ease_factor, quality);

    ReviewOutcome {
        state: next,
        interval_days,
        ease_factor: next.ease_factor,
        next_review_ms: now_ms.saturating_add(interval_days.saturating_mul(DAY_MS)),
        correct,
    }
}

/// Interval and ease every quality would produce from `state`
pub fn preview(state: &ReviewState, now_ms: i64) -> Vec<IntervalPreview> {
    Quality::all()
        .map(|quality| {
            let outcome = schedule(state, quality, now_ms);
            IntervalPreview {
                quality: quality.value(),
                interval_days: outcome.interval_days,
                ease_factor: outcome.ease_factor,
            }
        })
        .collect()
}

fn grow_interval(interval_days: i64, ease_factor: f64) -> i64 {
    let base = interval_days.max(1);
    let grown = (base as f64 * ease_factor).round();
    if grown >= MAX_INTERVAL_DAYS as f64 {
        return MAX_INTERVAL_DAYS;
    }
    (grown as i64).max(base + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_EASE_FACTOR;

    const NOW: i64 = 1_700_000_000_000;

    fn reviewed(interval_days: i64, ease_factor: f64, repetitions: u32) -> ReviewState {
        ReviewState {
            interval_days,
            ease_factor,
            repetitions,
            correct_count: repetitions,
            incorrect_count: 0,
        }
    }

    #[test]
    fn test_quality_clamps() {
        assert_eq!(Quality::new(-3).value(), 0);
        assert_eq!(Quality::new(9).value(), 5);
        assert_eq!(Quality::new(3).value(), 3);
        assert!(Quality::new(3).is_correct());
        assert!(!Quality::new(2).is_correct());
    }

    #[test]
    fn test_quality_deserializes_clamped() {
        let q: Quality = serde_json::from_str("42").unwrap();
        assert_eq!(q.value(), 5);
        assert_eq!(serde_json::to_string(&Quality::new(4)).unwrap(), "4");
    }

    #[test]
    fn test_quality_from_answer() {
        assert_eq!(Quality::from_answer(false, None).value(), 0);
        assert_eq!(Quality::from_answer(false, Some(800)).value(), 1);
        assert_eq!(Quality::from_answer(true, Some(1_500)).value(), 5);
        assert_eq!(Quality::from_answer(true, Some(6_000)).value(), 4);
        assert_eq!(Quality::from_answer(true, Some(30_000)).value(), 3);
        assert_eq!(Quality::from_answer(true, None).value(), 4);
    }

    #[test]
    fn test_quality_from_answer_time_boundaries() {
        assert_eq!(Quality::from_answer(true, Some(0)).value(), 5);
        assert_eq!(Quality::from_answer(true, Some(3_999)).value(), 5);
        assert_eq!(Quality::from_answer(true, Some(4_000)).value(), 4);
        assert_eq!(Quality::from_answer(true, Some(11_999)).value(), 4);
        assert_eq!(Quality::from_answer(true, Some(12_000)).value(), 3);
        assert_eq!(Quality::from_answer(false, Some(0)).value(), 1);
        assert_eq!(Quality::from_answer(false, Some(12_000)).value(), 1);
    }

    #[test]
    fn test_first_correct_review() {
        let outcome = schedule(&ReviewState::default(), Quality::new(4), NOW);
        assert_eq!(outcome.interval_days, 1);
        assert_eq!(outcome.state.repetitions, 1);
        assert_eq!(outcome.state.correct_count, 1);
        assert_eq!(outcome.next_review_ms, NOW + DAY_MS);
        assert!(outcome.correct);
    }

    #[test]
    fn test_second_correct_review() {
        let outcome = schedule(&reviewed(1, 2.5, 1), Quality::new(4), NOW);
        assert_eq!(outcome.interval_days, 6);
        assert_eq!(outcome.next_review_ms, NOW + 6 * DAY_MS);
    }

    #[test]
    fn test_subsequent_review_multiplies_by_prior_ease() {
        let outcome = schedule(&reviewed(10, 2.5, 4), Quality::new(5), NOW);
        assert_eq!(outcome.interval_days, 25);
        assert!((outcome.ease_factor - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_incorrect_resets_interval_and_streak() {
        let mut state = reviewed(30, 2.5, 5);
        state.incorrect_count = 2;
        let outcome = schedule(&state, Quality::new(1), NOW);
        assert_eq!(outcome.interval_days, 1);
        assert_eq!(outcome.state.repetitions, 0);
        assert_eq!(outcome.state.incorrect_count, 3);
        assert_eq!(outcome.state.correct_count, 5);
        assert!(!outcome.correct);
    }

    #[test]
    fn test_ease_formula() {
        assert!((next_ease_factor(2.5, Quality::new(5)) - 2.6).abs() < 1e-9);
        assert!((next_ease_factor(2.5, Quality::new(4)) - 2.5).abs() < 1e-9);
        assert!((next_ease_factor(2.5, Quality::new(3)) - 2.36).abs() < 1e-9);
        assert!((next_ease_factor(2.5, Quality::new(0)) - 1.7).abs() < 1e-9);
    }

    #[test]
    fn test_ease_floor() {
        let mut state = reviewed(10, 1.4, 3);
        for _ in 0..5 {
            let outcome = schedule(&state, Quality::new(0), NOW);
            assert!(outcome.ease_factor >= MIN_EASE_FACTOR);
            state = outcome.state;
        }
        assert_eq!(state.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn test_invalid_prior_state_is_sanitized() {
        let state = ReviewState {
            interval_days: -10,
            ease_factor: f64::NAN,
            ..ReviewState::default()
        };
        let outcome = schedule(&state, Quality::new(4), NOW);
        assert_eq!(outcome.interval_days, 1);
        assert!((outcome.ease_factor - DEFAULT_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_interval_capped() {
        let outcome = schedule(&reviewed(30_000, 2.5, 10), Quality::new(5), NOW);
        assert_eq!(outcome.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_preview_covers_every_quality() {
        let previews = preview(&reviewed(6, 2.5, 2), NOW);
        assert_eq!(previews.len(), 6);
        assert!(previews[..3].iter().all(|p| p.interval_days == 1));
        assert_eq!(previews[4].interval_days, 15);
        assert_eq!(previews[5].interval_days, 15);
    }
}
