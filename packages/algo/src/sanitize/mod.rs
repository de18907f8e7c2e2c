//! Data Sanitization
//!
//! Numerical guards applied to counters read back from storage or
//! received from clients before any scheduling arithmetic runs.

use crate::types::{ReviewState, DEFAULT_EASE_FACTOR, MAX_INTERVAL_DAYS, MIN_EASE_FACTOR};

/// Replace NaN / Inf with `fallback`
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Clamp into [0, 1], mapping non-finite values to 0
pub fn clamp_unit(value: f64) -> f64 {
    finite_or(value, 0.0).clamp(0.0, 1.0)
}

/// Non-finite ease factors fall back to the default, everything else is
/// floored at the SM-2 minimum.
pub fn sanitize_ease_factor(ease_factor: f64) -> f64 {
    finite_or(ease_factor, DEFAULT_EASE_FACTOR).max(MIN_EASE_FACTOR)
}

pub fn sanitize_interval(interval_days: i64) -> i64 {
    interval_days.clamp(0, MAX_INTERVAL_DAYS)
}

pub fn sanitize_state(state: &ReviewState) -> ReviewState {
    ReviewState {
        interval_days: sanitize_interval(state.interval_days),
        ease_factor: sanitize_ease_factor(state.ease_factor),
        ..*state
    }
}
