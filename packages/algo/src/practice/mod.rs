//! Practice Set Selection
//!
//! Builds a review quiz from a learner's items: due items first (most
//! overdue first), then a weakness-weighted random draw over the rest.
//! The draw uses a seeded ChaCha RNG so a seed always reproduces the set.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::sanitize::clamp_unit;
use crate::types::PracticeCandidate;

/// Every candidate keeps a small chance of being picked
const BASE_WEIGHT: f64 = 0.1;

pub fn select_practice_set(
    candidates: &[PracticeCandidate],
    size: usize,
    seed: u64,
) -> Vec<String> {
    if size == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let (mut due, rest): (Vec<&PracticeCandidate>, Vec<&PracticeCandidate>) =
        candidates.iter().partition(|c| c.is_due());

    due.sort_by(|a, b| {
        b.overdue_ms
            .cmp(&a.overdue_ms)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let mut selected: Vec<String> = due
        .iter()
        .take(size)
        .map(|c| c.item_id.clone())
        .collect();

    let remaining = size - selected.len();
    if remaining > 0 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        selected.extend(weighted_sample(&rest, remaining, &mut rng));
    }

    selected
}

/// Weighted sampling without replacement
fn weighted_sample(
    pool: &[&PracticeCandidate],
    count: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<String> {
    let mut entries: Vec<(&str, f64)> = pool
        .iter()
        .map(|c| (c.item_id.as_str(), BASE_WEIGHT + clamp_unit(c.weakness)))
        .collect();
    // input order must not leak into the draw
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut picked = Vec::with_capacity(count.min(entries.len()));
    while picked.len() < count && !entries.is_empty() {
        let total: f64 = entries.iter().map(|(_, w)| *w).sum();
        let mut target = rng.gen::<f64>() * total;
        let mut index = entries.len() - 1;
        for (i, (_, weight)) in entries.iter().enumerate() {
            if target < *weight {
                index = i;
                break;
            }
            target -= weight;
        }
        let (id, _) = entries.remove(index);
        picked.push(id.to_string());
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn candidate(id: &str, weakness: f64, overdue_ms: i64) -> PracticeCandidate {
        PracticeCandidate {
            item_id: id.to_string(),
            weakness,
            overdue_ms,
        }
    }

    #[test]
    fn test_due_items_first_most_overdue_first() {
        let candidates = vec![
            candidate("later", 0.9, -5_000),
            candidate("due-a", 0.1, 1_000),
            candidate("due-b", 0.1, 50_000),
        ];
        let set = select_practice_set(&candidates, 2, 7);
        assert_eq!(set, vec!["due-b".to_string(), "due-a".to_string()]);
    }

    #[test]
    fn test_fills_with_non_due_without_duplicates() {
        let candidates: Vec<PracticeCandidate> = (0..10)
            .map(|i| candidate(&format!("c{i}"), i as f64 / 10.0, -1))
            .collect();
        let set = select_practice_set(&candidates, 6, 42);
        assert_eq!(set.len(), 6);
        let unique: HashSet<&String> = set.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_same_seed_same_set() {
        let candidates: Vec<PracticeCandidate> = (0..30)
            .map(|i| candidate(&format!("c{i}"), (i % 7) as f64 / 7.0, -1))
            .collect();
        let mut reversed = candidates.clone();
        reversed.reverse();
        assert_eq!(
            select_practice_set(&candidates, 8, 99),
            select_practice_set(&reversed, 8, 99)
        );
    }

    #[test]
    fn test_size_larger_than_pool() {
        let candidates = vec![candidate("a", 0.5, 10), candidate("b", 0.5, -10)];
        let set = select_practice_set(&candidates, 10, 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0], "a");
    }

    #[test]
    fn test_weak_items_drawn_more_often() {
        let candidates = vec![candidate("weak", 1.0, -1), candidate("fine", 0.0, -1)];
        let weak_first = (0..200u64)
            .filter(|seed| select_practice_set(&candidates, 1, *seed)[0] == "weak")
            .count();
        // expected ratio 1.1 / 1.2
        assert!(weak_first > 150, "weak drawn first {weak_first} times");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(select_practice_set(&[], 5, 1).is_empty());
        assert!(select_practice_set(&[candidate("a", 0.5, 0)], 0, 1).is_empty());
    }
}
