//! Greedy CTC decoding of the raw output tensor, matching the decoder the
//! firmware runs on-device.
//!
//! Used when a board only reports the integer tensor (`m-results-[...]`) and
//! not the decoded transcript.

/// Output classes in index order; `@` is the blank token.
pub const ALPHABET: &[u8; 29] = b"abcdefghijklmnopqrstuvwxyz' @";

pub const BLANK: usize = 28;

/// Collapses per-timestep argmax classes into text.
///
/// A class is emitted when it is not blank and differs from the previous
/// timestep's class; a blank resets the repeat guard so `a @ a` yields `aa`.
/// Ties go to the lowest class index. A trailing partial timestep is ignored.
pub fn greedy_decode(logits: &[i8], classes: usize) -> String {
    if classes == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut prev: Option<usize> = None;
    for step in logits.chunks_exact(classes) {
        let best = argmax(step);
        if best == BLANK {
            prev = None;
            continue;
        }
        if prev != Some(best) {
            if let Some(&ch) = ALPHABET.get(best) {
                out.push(ch as char);
            }
        }
        prev = Some(best);
    }
    out
}

fn argmax(scores: &[i8]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }
    best
}
