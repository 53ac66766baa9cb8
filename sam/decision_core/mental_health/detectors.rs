use std::collections::{BTreeSet, VecDeque};

/// Calculates an exponentially weighted moving average.
#[must_use]
pub fn ewma(previous: f64, next: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    (alpha * next) + ((1.0 - alpha) * previous)
}

/// Lowercased alphanumeric tokens of a goal, joined by single spaces.
#[must_use]
pub fn normalize_goal(goal: &str) -> String {
    goal.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set Jaccard similarity of two normalized goals.
///
/// A goal without tokens is similar to nothing, itself included.
#[must_use]
pub fn goal_similarity(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / total as f64;
    ratio
}

/// Number of window entries at least `threshold` similar to `goal`.
#[must_use]
pub fn count_similar(window: &VecDeque<String>, goal: &str, threshold: f64) -> u32 {
    let hits = window
        .iter()
        .filter(|previous| goal_similarity(previous, goal) >= threshold)
        .count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

/// Share of `true` entries in the window.
#[must_use]
pub fn true_fraction(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let hits = window.iter().filter(|flag| **flag).count();
    #[allow(clippy::cast_precision_loss)]
    let fraction = hits as f64 / window.len() as f64;
    fraction
}

/// Population standard deviation, zero for fewer than two samples.
#[must_use]
pub fn std_dev(samples: &VecDeque<f64>) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / count;
    let variance = samples
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / count;
    variance.sqrt()
}

/// Appends to a bounded window, dropping the oldest entries.
pub fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity.max(1) {
        window.pop_front();
    }
}
