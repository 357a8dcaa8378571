//! String similarity for near-duplicate suppression.
//!
//! `ratio` is a Ratcliff/Obershelp matching-blocks ratio over characters:
//! symmetric, in `[0.0, 1.0]`, and exactly `1.0` only for identical strings.
//! The merge layer treats the 0.80 threshold as policy; any function meeting
//! this contract would do.

/// Similarity ratio between two strings: `2 * matches / (len_a + len_b)`,
/// where `matches` is the total length of the recursively longest common
/// substrings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / total as f64
}

/// Total length of matching blocks, found by repeatedly taking the longest
/// common substring and recursing on the pieces to its left and right.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matches = 0;
    // Explicit work stack of (a-range, b-range) segment pairs.
    let mut stack = vec![((0, a.len()), (0, b.len()))];
    while let Some(((alo, ahi), (blo, bhi))) = stack.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (ai, bj, size) = longest_common_substring(&a[alo..ahi], &b[blo..bhi]);
        if size == 0 {
            continue;
        }
        matches += size;
        stack.push(((alo, alo + ai), (blo, blo + bj)));
        stack.push(((alo + ai + size, ahi), (blo + bj + size, bhi)));
    }
    matches
}

/// Longest common substring of two slices, as (start_a, start_b, length).
/// Rolling one-row DP keeps it O(len_b) in memory.
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut row = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut prev = 0;
        for (j, &cb) in b.iter().enumerate() {
            let cur = row[j + 1];
            if ca == cb {
                let run = prev + 1;
                row[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            } else {
                row[j + 1] = 0;
            }
            prev = cur;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_exactly_one() {
        assert_eq!(ratio("Use PostgreSQL", "Use PostgreSQL"), 1.0);
        assert_eq!(ratio("", ""), 1.0);
    }

    #[test]
    fn distinct_strings_are_below_one() {
        assert!(ratio("Use PostgreSQL", "Use PostgreSQL!") < 1.0);
        assert!(ratio("abc", "") < 1.0);
    }

    #[test]
    fn symmetric() {
        let a = "Migrate the ingestion service";
        let b = "Migrate ingestion to the new service";
        assert!((ratio(a, b) - ratio(b, a)).abs() < 1e-12);
    }

    #[test]
    fn rephrased_decision_crosses_threshold() {
        let r = ratio(
            "Use PostgreSQL for storage",
            "Use PostgreSQL for the storage layer",
        );
        assert!(r >= 0.80, "expected >= 0.80, got {r}");
    }

    #[test]
    fn unrelated_strings_stay_low() {
        let r = ratio("Adopt trunk-based development", "Order more coffee beans");
        assert!(r < 0.5, "expected < 0.5, got {r}");
    }

    #[test]
    fn multibyte_input_is_handled_per_character() {
        let r = ratio("naïve approach", "naïve approach");
        assert_eq!(r, 1.0);
        assert!(ratio("résumé", "resume") < 1.0);
    }
}
