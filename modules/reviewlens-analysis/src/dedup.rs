use std::collections::HashSet;

use tracing::{info, warn};

use reviewlens_common::Review;

use crate::normalize::normalize;

/// Reviews with no comparable text are never treated as duplicates.
pub fn has_text(review: &Review) -> bool {
    !review.text.trim().is_empty()
}

/// Give every review a distinct id. Scraped ids can repeat, and a
/// synthetic `review-{position}` id can match a real one. A repeated id is
/// renamed to `{id}~{n}` with the smallest `n >= 2` that no review uses, so
/// the result depends only on input order. Returns the reviews and how many
/// ids were renamed.
pub fn ensure_unique_ids(mut reviews: Vec<Review>) -> (Vec<Review>, usize) {
    let original: HashSet<String> = reviews.iter().map(|r| r.id.clone()).collect();
    let mut assigned: HashSet<String> = HashSet::with_capacity(reviews.len());
    let mut renamed = 0;

    for review in &mut reviews {
        if assigned.insert(review.id.clone()) {
            continue;
        }
        let replacement = (2..)
            .map(|n| format!("{}~{n}", review.id))
            .find(|candidate| !original.contains(candidate) && !assigned.contains(candidate))
            .unwrap_or_default();
        warn!(
            review_id = review.id.as_str(),
            renamed_to = replacement.as_str(),
            "Duplicate review id, renamed"
        );
        assigned.insert(replacement.clone());
        review.id = replacement;
        renamed += 1;
    }

    (reviews, renamed)
}

/// Drop reviews whose normalized text was already seen. Input order is kept
/// and the first occurrence wins. Reviews without text always survive.
pub fn dedupe(reviews: Vec<Review>) -> Vec<Review> {
    let before = reviews.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);

    let kept: Vec<Review> = reviews
        .into_iter()
        .filter(|review| !has_text(review) || seen.insert(normalize(&review.text)))
        .collect();

    let removed = before - kept.len();
    if removed > 0 {
        info!(before, after = kept.len(), removed, "Removed duplicate reviews");
    }
    kept
}

/// Enforce `len <= reported_total` when the total is known.
///
/// Excess reviews are truncated by position: the first `reported_total`
/// reviews are kept in their original order. No quality signal is used to
/// pick survivors, so the same input always yields the same output.
pub fn reconcile_against_total(mut reviews: Vec<Review>, reported_total: u32) -> Vec<Review> {
    let limit = reported_total as usize;
    if limit > 0 && reviews.len() > limit {
        info!(
            before = reviews.len(),
            reported_total,
            discarded = reviews.len() - limit,
            "Truncated reviews to reported total"
        );
        reviews.truncate(limit);
    }
    reviews
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str, text: &str) -> Review {
        Review {
            id: id.to_string(),
            text: text.to_string(),
            rating: 4,
            verified: true,
            posted_at: None,
        }
    }

    fn ids(reviews: &[Review]) -> Vec<&str> {
        reviews.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn repeated_and_synthetic_ids_are_renamed() {
        let reviews = vec![
            review("review-1", "first"),
            review("review-1", "synthetic id from position 1"),
            review("x", "third"),
            review("x", "fourth"),
            review("x~2", "real id that looks like a rename"),
        ];
        let (unique, renamed) = ensure_unique_ids(reviews);

        assert_eq!(renamed, 2);
        assert_eq!(ids(&unique), vec!["review-1", "review-1~2", "x", "x~3", "x~2"]);
        let distinct: HashSet<&str> = unique.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(distinct.len(), unique.len());
    }

    #[test]
    fn unique_ids_are_left_alone() {
        let reviews: Vec<Review> = (0..5).map(|i| review(&format!("r{i}"), "t")).collect();
        let (unique, renamed) = ensure_unique_ids(reviews.clone());
        assert_eq!(renamed, 0);
        assert_eq!(unique, reviews);
    }

    #[test]
    fn first_occurrence_wins() {
        let reviews = vec![
            review("a", "Love it!"),
            review("b", "Broke after a week"),
            review("c", "love   it"),
            review("d", "LOVE IT."),
        ];
        assert_eq!(ids(&dedupe(reviews)), vec!["a", "b"]);
    }

    #[test]
    fn empty_text_is_always_kept() {
        let reviews = vec![
            review("a", ""),
            review("b", "   "),
            review("c", ""),
            review("d", "fine"),
        ];
        assert_eq!(ids(&dedupe(reviews)), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn input_without_text_is_returned_unchanged() {
        let reviews = vec![review("a", ""), review("b", ""), review("c", "")];
        let kept = dedupe(reviews.clone());
        assert_eq!(kept, reviews);
        assert_eq!(ids(&reconcile_against_total(kept, 2)), vec!["a", "b"]);
    }

    #[test]
    fn dedupe_leaves_no_shared_keys() {
        let texts = [
            "Great value", "great VALUE!", "meh", "Meh.", "", "", "Works", "works ", "Works!!",
            "Different", "great value", "   ",
        ];
        let reviews: Vec<Review> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| review(&format!("r{i}"), t))
            .collect();
        let input_len = reviews.len();

        let kept = dedupe(reviews);
        assert!(kept.len() <= input_len);

        let mut keys = HashSet::new();
        for r in kept.iter().filter(|r| has_text(r)) {
            assert!(keys.insert(normalize(&r.text)), "duplicate key for {}", r.id);
        }
    }

    #[test]
    fn truncation_keeps_leading_reviews_in_order() {
        let reviews: Vec<Review> = (0..9).map(|i| review(&format!("r{i}"), &format!("text {i}"))).collect();
        let kept = reconcile_against_total(reviews, 5);
        assert_eq!(ids(&kept), vec!["r0", "r1", "r2", "r3", "r4"]);
    }

    #[test]
    fn unknown_total_disables_truncation() {
        let reviews: Vec<Review> = (0..4).map(|i| review(&format!("r{i}"), "x")).collect();
        assert_eq!(reconcile_against_total(reviews.clone(), 0), reviews);
        assert_eq!(reconcile_against_total(reviews.clone(), 10), reviews);
    }

    #[test]
    fn reconciled_set_never_exceeds_total() {
        for total in 1..=12u32 {
            for n in 0..=12usize {
                let reviews: Vec<Review> =
                    (0..n).map(|i| review(&format!("r{i}"), &format!("unique {i}"))).collect();
                let kept = reconcile_against_total(dedupe(reviews), total);
                assert!(kept.len() <= total as usize);
                assert_eq!(kept.len(), n.min(total as usize));
            }
        }
    }
}
