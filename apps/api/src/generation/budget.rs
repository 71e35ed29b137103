//! Word-count budgets and engine version selection.
//!
//! The total word limit splits 10% intro / 80% body / 10% conclusion, with the
//! body share divided evenly across STAR examples. The engine carries one
//! pinned workflow version per supported example count.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordBudget {
    pub intro: u32,
    pub per_star: u32,
    pub conclusion: u32,
}

const INTRO_SHARE: f64 = 0.10;
const BODY_SHARE: f64 = 0.80;
const CONCLUSION_SHARE: f64 = 0.10;

/// Splits `pitch_word_limit` into per-section budgets.
pub fn word_budget(pitch_word_limit: u32, star_count: usize) -> WordBudget {
    let limit = f64::from(pitch_word_limit);
    let stars = star_count.max(1) as f64;

    WordBudget {
        intro: (limit * INTRO_SHARE).round() as u32,
        per_star: (limit * BODY_SHARE / stars).round() as u32,
        conclusion: (limit * CONCLUSION_SHARE).round() as u32,
    }
}

/// Maps a STAR example count to the engine-side workflow version label.
/// Counts outside the supported 2–4 range fall back to the two-example version.
pub fn version_label(star_count: usize) -> &'static str {
    match star_count {
        2 => "v1.2",
        3 => "v1.3",
        4 => "v1.4",
        other => {
            warn!("Unexpected STAR example count {other}, defaulting to v1.2");
            "v1.2"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_splits_500_across_two_examples() {
        let budget = word_budget(500, 2);
        assert_eq!(budget.intro, 50);
        assert_eq!(budget.per_star, 200);
        assert_eq!(budget.conclusion, 50);
    }

    #[test]
    fn test_budget_splits_650_across_three_examples() {
        let budget = word_budget(650, 3);
        assert_eq!(budget.intro, 65);
        // 650 * 0.80 / 3 = 173.33 → 173
        assert_eq!(budget.per_star, 173);
        assert_eq!(budget.conclusion, 65);
    }

    #[test]
    fn test_budget_tolerates_zero_examples() {
        // Validation rejects empty STAR lists upstream, but the split itself
        // must not divide by zero.
        let budget = word_budget(400, 0);
        assert_eq!(budget.per_star, 320);
    }

    #[test]
    fn test_version_label_by_example_count() {
        assert_eq!(version_label(2), "v1.2");
        assert_eq!(version_label(3), "v1.3");
        assert_eq!(version_label(4), "v1.4");
        assert_eq!(version_label(1), "v1.2");
        assert_eq!(version_label(7), "v1.2");
    }
}
