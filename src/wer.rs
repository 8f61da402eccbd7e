//! Word error rate over a corpus of (reference, hypothesis) pairs.

/// A corpus-level word error metric.
///
/// `truths[i]` is scored against `predictions[i]`; callers must keep both
/// lists in the same case order.
pub trait WordErrorRate {
    fn wer(&self, truths: &[String], predictions: &[String]) -> f64;
}

/// Word-level Levenshtein distance summed over all pairs and divided by the
/// total number of reference words.
///
/// Pairs beyond the shorter list are ignored. A corpus with no reference words
/// is divided by 1 so the result stays finite.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceWer;

impl WordErrorRate for EditDistanceWer {
    fn wer(&self, truths: &[String], predictions: &[String]) -> f64 {
        let mut edits = 0usize;
        let mut reference_words = 0usize;
        for (truth, prediction) in truths.iter().zip(predictions) {
            let reference: Vec<&str> = truth.split_whitespace().collect();
            let hypothesis: Vec<&str> = prediction.split_whitespace().collect();
            edits += edit_distance(&reference, &hypothesis);
            reference_words += reference.len();
        }
        edits as f64 / reference_words.max(1) as f64
    }
}

/// Minimum substitutions + deletions + insertions turning `a` into `b`.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, item_a) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, item_b) in b.iter().enumerate() {
            let cost = usize::from(item_a != item_b);
            let next = (row[j] + 1).min(row[j + 1] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}
