//! # tutorly-algo - tutoring core algorithms
//!
//! Pure Rust, no I/O. The backend feeds it rows it loaded from storage and
//! persists whatever comes back.
//!
//! ## Modules
//!
//! - [`sm2`] - simplified SM-2 review scheduler (interval, ease factor, due date)
//! - [`analytics`] - accuracy, mastery, retention, weakness detection, streaks
//! - [`practice`] - seeded practice-set selection for review quizzes
//! - [`sanitize`] - numeric guards
//! - [`types`] - shared types and constants
//!
//! ## Example
//!
//! ```rust
//! use tutorly_algo::{schedule, Quality, ReviewState};
//!
//! let now_ms = 1_700_000_000_000;
//! let outcome = schedule(&ReviewState::default(), Quality::new(4), now_ms);
//! assert_eq!(outcome.interval_days, 1);
//! assert!(outcome.ease_factor >= 1.3);
//! ```

pub mod analytics;
pub mod practice;
pub mod sanitize;
pub mod sm2;
pub mod types;

pub use types::*;

pub use sm2::{next_ease_factor, preview, schedule, Quality};

pub use analytics::{
    day_index, detect_weaknesses, estimated_retention, mastery_level, study_streak, summarize,
    topic_breakdown, weakness_score,
};

pub use practice::select_practice_set;
