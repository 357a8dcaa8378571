//! Transcript splitting into bounded, slightly overlapping chunks.
//!
//! Sizes are byte counts; every cut point is snapped to a UTF-8 character
//! boundary so a chunk never splits a code point. Paragraph breaks (`\n\n`)
//! near the end of a window are preferred over hard size cuts.

use std::ops::Range;

/// Split `text` into chunk slices of at most `max_size` bytes with roughly
/// `overlap` bytes shared between neighbours.
///
/// Texts no longer than `max_size` come back as a single chunk, unchanged.
pub fn split<'a>(text: &'a str, max_size: usize, overlap: usize) -> Vec<&'a str> {
    spans(text, max_size, overlap)
        .into_iter()
        .map(|range| &text[range])
        .collect()
}

/// The byte ranges behind [`split`]. Adjacent spans never leave a gap:
/// `spans[i + 1].start <= spans[i].end`.
///
/// Termination: each iteration either advances `start` past the previous one
/// or jumps it to `end`, so the walk finishes within
/// `ceil(len / (max_size - overlap)) + 1` steps for any `overlap < max_size`.
pub fn spans(text: &str, max_size: usize, overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(max_size > 0);
    if text.len() <= max_size {
        return vec![0..text.len()];
    }

    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = floor_char_boundary(text, (start + max_size).min(text.len()));
        if end < text.len() {
            // Look for a paragraph break in the last quarter of the window.
            let search_start =
                floor_char_boundary(text, end.saturating_sub(max_size / 4)).max(start);
            if let Some(pos) = text[search_start..end].rfind("\n\n") {
                let para_break = search_start + pos;
                if para_break > start {
                    end = para_break + 2; // keep the double newline with this chunk
                }
            }
        }
        out.push(start..end);

        let mut next = floor_char_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            // Tiny final chunk: drop the overlap rather than stall.
            next = end;
        }
        start = next;
    }
    out
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "hello world";
        assert_eq!(split(text, 100, 10), vec![text]);
        assert_eq!(split(text, text.len(), 2), vec![text]);
    }

    #[test]
    fn long_text_covers_every_byte() {
        let text = "alpha beta gamma delta ".repeat(50);
        let spans = spans(&text, 100, 20);
        assert!(spans.len() > 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
        for pair in spans.windows(2) {
            assert!(
                pair[1].start <= pair[0].end,
                "gap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
            assert!(pair[1].start > pair[0].start, "no forward progress");
        }
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let mut text = String::new();
        text.push_str(&"a".repeat(90));
        text.push_str("\n\n");
        text.push_str(&"b".repeat(100));
        let chunks = split(&text, 100, 0);
        assert!(chunks[0].ends_with("\n\n"), "chunk should end at the break");
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn size_cut_when_no_paragraph_break_in_window() {
        let text = "x".repeat(250);
        let spans = spans(&text, 100, 10);
        assert_eq!(spans[0], 0..100);
        assert_eq!(spans[1].start, 90);
    }

    #[test]
    fn overlap_is_shared_between_neighbours() {
        let text: String = ('a'..='z').cycle().take(300).collect();
        let chunks = split(&text, 100, 20);
        let first_tail = &chunks[0][chunks[0].len() - 20..];
        assert!(chunks[1].starts_with(first_tail));
    }

    #[test]
    fn never_splits_a_code_point() {
        let text = "é".repeat(200); // 2 bytes per char
        for chunk in split(&text, 101, 7) {
            assert!(chunk.chars().all(|c| c == 'é'));
        }
    }

    proptest! {
        // Break-free text: every window advances by exactly max_size - overlap
        // (bar the last), so the step bound is tight here.
        #[test]
        fn terminates_within_bound(
            text in "[a-z ]{0,2000}",
            max_size in 8usize..200,
            overlap in 0usize..200,
        ) {
            prop_assume!(overlap < max_size);
            let spans = spans(&text, max_size, overlap);
            let bound = text.len().div_ceil(max_size - overlap) + 1;
            prop_assert!(spans.len() <= bound.max(1), "{} spans > bound {}", spans.len(), bound);
            prop_assert_eq!(spans.last().unwrap().end, text.len());
        }

        #[test]
        fn covers_without_gaps(
            text in "[a-z \n]{0,2000}",
            max_size in 8usize..200,
            overlap in 0usize..8,
        ) {
            prop_assume!(overlap < max_size);
            let spans = spans(&text, max_size, overlap);
            prop_assert_eq!(spans[0].start, 0);
            prop_assert_eq!(spans.last().unwrap().end, text.len());
            for pair in spans.windows(2) {
                prop_assert!(pair[1].start <= pair[0].end);
                prop_assert!(pair[1].start > pair[0].start);
            }
        }
    }
}
