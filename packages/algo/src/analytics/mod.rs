//! Learning Analytics
//!
//! Everything here is derived from the per-item counters the scheduler
//! maintains:
//!
//! - accuracy and mastery level per item
//! - estimated retention (exponential forgetting anchored so recall is
//!   90% when the item comes due)
//! - weakness scoring and detection
//! - per-topic breakdown, overall progress summary and study streaks

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::sanitize::{clamp_unit, sanitize_ease_factor};
use crate::types::{
    ItemStats, MasteryLevel, ProgressSummary, StreakInfo, TopicSummary, Weakness, WeaknessConfig,
    WeaknessReason, DAY_MS, DEFAULT_EASE_FACTOR, MASTERY_ACCURACY, MASTERY_INTERVAL_DAYS,
    MIN_EASE_FACTOR, TARGET_RETENTION,
};

const LOW_ACCURACY: f64 = 0.6;
const LOW_EASE: f64 = 1.8;
const REPEATED_LAPSES: u32 = 3;

/// Day number since the Unix epoch (UTC)
pub fn day_index(ms: i64) -> i64 {
    ms.div_euclid(DAY_MS)
}

pub fn accuracy(correct: u32, incorrect: u32) -> Option<f64> {
    let total = correct as u64 + incorrect as u64;
    if total == 0 {
        return None;
    }
    Some(correct as f64 / total as f64)
}

pub fn item_accuracy(item: &ItemStats) -> Option<f64> {
    accuracy(item.state.correct_count, item.state.incorrect_count)
}

pub fn mastery_level(item: &ItemStats) -> MasteryLevel {
    let state = &item.state;
    if state.is_new() {
        return MasteryLevel::New;
    }

    let acc = item_accuracy(item).unwrap_or(0.0);
    if state.interval_days >= MASTERY_INTERVAL_DAYS && acc >= MASTERY_ACCURACY {
        MasteryLevel::Mastered
    } else if state.repetitions < 2 || state.interval_days < 6 {
        MasteryLevel::Learning
    } else {
        MasteryLevel::Reviewing
    }
}

/// Items without a due date are treated as due immediately.
pub fn is_due(item: &ItemStats, now_ms: i64) -> bool {
    item.next_review_ms.map_or(true, |due| due <= now_ms)
}

/// Due for more than a full day
pub fn is_overdue(item: &ItemStats, now_ms: i64) -> bool {
    item.next_review_ms
        .is_some_and(|due| due <= now_ms.saturating_sub(DAY_MS))
}

pub fn estimated_retention(item: &ItemStats, now_ms: i64) -> f64 {
    let Some(last) = item.last_reviewed_ms else {
        return 1.0;
    };
    let interval = item.state.interval_days.max(1) as f64;
    let elapsed_days = now_ms.saturating_sub(last).max(0) as f64 / DAY_MS as f64;
    clamp_unit(TARGET_RETENTION.powf(elapsed_days / interval))
}

pub fn weakness_score(item: &ItemStats, now_ms: i64, config: &WeaknessConfig) -> f64 {
    let error_rate = item_accuracy(item).map_or(0.0, |acc| 1.0 - acc);
    let ease = sanitize_ease_factor(item.state.ease_factor);
    let ease_penalty = clamp_unit((DEFAULT_EASE_FACTOR - ease) / (DEFAULT_EASE_FACTOR - MIN_EASE_FACTOR));
    let forgetting = 1.0 - estimated_retention(item, now_ms);

    let weight_sum = config.error_weight + config.ease_weight + config.forgetting_weight;
    if weight_sum <= 0.0 || !weight_sum.is_finite() {
        return 0.0;
    }

    clamp_unit(
        (config.error_weight * error_rate
            + config.ease_weight * ease_penalty
            + config.forgetting_weight * forgetting)
            / weight_sum,
    )
}

/// Scores one item and returns it when it qualifies as a weakness.
pub fn evaluate_item(item: &ItemStats, now_ms: i64, config: &WeaknessConfig) -> Option<Weakness> {
    if item.state.attempts() < config.min_attempts {
        return None;
    }

    let score = weakness_score(item, now_ms, config);
    if score < config.threshold {
        return None;
    }

    let accuracy = item_accuracy(item).unwrap_or(0.0);
    let ease_factor = sanitize_ease_factor(item.state.ease_factor);
    let retention = estimated_retention(item, now_ms);

    let mut reasons = Vec::new();
    if accuracy < LOW_ACCURACY {
        reasons.push(WeaknessReason::LowAccuracy);
    }
    if ease_factor < LOW_EASE {
        reasons.push(WeaknessReason::LowEase);
    }
    if is_overdue(item, now_ms) {
        reasons.push(WeaknessReason::Overdue);
    }
    if item.state.incorrect_count >= REPEATED_LAPSES {
        reasons.push(WeaknessReason::RepeatedLapses);
    }

    Some(Weakness {
        item_id: item.item_id.clone(),
        topic: item.topic.clone(),
        score,
        accuracy,
        ease_factor,
        retention,
        reasons,
    })
}

pub fn detect_weaknesses(
    items: &[ItemStats],
    now_ms: i64,
    config: &WeaknessConfig,
) -> Vec<Weakness> {
    let mut weaknesses: Vec<Weakness> = items
        .par_iter()
        .filter_map(|item| evaluate_item(item, now_ms, config))
        .collect();

    weaknesses.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    weaknesses.truncate(config.limit);
    weaknesses
}

#[derive(Default)]
struct TopicAccumulator {
    items: usize,
    correct: u64,
    incorrect: u64,
    mastered: usize,
    weak: usize,
    ease_sum: f64,
}

pub fn topic_breakdown(
    items: &[ItemStats],
    now_ms: i64,
    config: &WeaknessConfig,
) -> Vec<TopicSummary> {
    let mut topics: BTreeMap<&str, TopicAccumulator> = BTreeMap::new();

    for item in items {
        let acc = topics.entry(item.topic.as_str()).or_default();
        acc.items += 1;
        acc.correct += item.state.correct_count as u64;
        acc.incorrect += item.state.incorrect_count as u64;
        acc.ease_sum += sanitize_ease_factor(item.state.ease_factor);
        if mastery_level(item) == MasteryLevel::Mastered {
            acc.mastered += 1;
        }
        if evaluate_item(item, now_ms, config).is_some() {
            acc.weak += 1;
        }
    }

    let mut summaries: Vec<TopicSummary> = topics
        .into_iter()
        .map(|(topic, acc)| {
            let attempts = acc.correct + acc.incorrect;
            TopicSummary {
                topic: topic.to_string(),
                items: acc.items,
                attempts,
                accuracy: (attempts > 0).then(|| acc.correct as f64 / attempts as f64),
                mastered: acc.mastered,
                weak: acc.weak,
                average_ease: acc.ease_sum / acc.items as f64,
            }
        })
        .collect();

    // weakest first, unattempted topics last
    summaries.sort_by(|a, b| match (a.accuracy, b.accuracy) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.topic.cmp(&b.topic)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.topic.cmp(&b.topic),
    });
    summaries
}

pub fn summarize(items: &[ItemStats], now_ms: i64, config: &WeaknessConfig) -> ProgressSummary {
    let mut summary = ProgressSummary {
        total_items: items.len(),
        ..ProgressSummary::default()
    };

    let mut correct: u64 = 0;
    let mut reviewed = 0usize;
    let mut ease_sum = 0.0;
    let mut retention_sum = 0.0;

    for item in items {
        match mastery_level(item) {
            MasteryLevel::New => summary.new_items += 1,
            MasteryLevel::Learning => summary.learning_items += 1,
            MasteryLevel::Reviewing => summary.reviewing_items += 1,
            MasteryLevel::Mastered => summary.mastered_items += 1,
        }
        if is_due(item, now_ms) {
            summary.due_now += 1;
        }
        if is_overdue(item, now_ms) {
            summary.overdue += 1;
        }
        if evaluate_item(item, now_ms, config).is_some() {
            summary.weak_items += 1;
        }

        summary.total_attempts += item.state.attempts() as u64;
        correct += item.state.correct_count as u64;

        if !item.state.is_new() {
            reviewed += 1;
            ease_sum += sanitize_ease_factor(item.state.ease_factor);
            retention_sum += estimated_retention(item, now_ms);
        }
    }

    if summary.total_attempts > 0 {
        summary.accuracy = Some(correct as f64 / summary.total_attempts as f64);
    }
    if reviewed > 0 {
        summary.average_ease = Some(ease_sum / reviewed as f64);
        summary.average_retention = Some(retention_sum / reviewed as f64);
    }

    summary
}

/// `active_days` are day indices (see [`day_index`]); order and duplicates
/// do not matter, days after `today` are ignored.
pub fn study_streak(active_days: &[i64], today: i64) -> StreakInfo {
    let mut days: Vec<i64> = active_days.iter().copied().filter(|d| *d <= today).collect();
    days.sort_unstable();
    days.dedup();

    let Some(&last) = days.last() else {
        return StreakInfo::default();
    };

    let mut longest = 1u32;
    let mut run = 1u32;
    for pair in days.windows(2) {
        if pair[1] == pair[0] + 1 {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    let current = if today - last <= 1 { run } else { 0 };

    StreakInfo {
        current,
        longest,
        active_today: last == today,
    }
}
