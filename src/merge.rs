//! Merging per-chunk extraction records into one, with near-duplicate
//! suppression.
//!
//! Free-text categories dedupe by pairwise similarity against already-kept
//! items (first seen wins). Action items and ideas that restate a kept
//! decision are dropped so the same call isn't counted twice. Concepts and
//! terms are short canonical keys that rarely vary in phrasing, so they
//! dedupe by exact match — fuzzy matching there would merge distinct entities
//! with superficial overlap.

use rustc_hash::FxHashSet;

use crate::record::{ExtractionRecord, KnowledgeItem};
use crate::similarity;

/// Two free-text items are considered the same real-world item at or above
/// this similarity.
pub const SIMILARITY_THRESHOLD: f64 = 0.80;

/// Merge chunk records in order into a single record.
pub fn merge_records(records: Vec<ExtractionRecord>) -> ExtractionRecord {
    let mut all = ExtractionRecord::default();
    let mut tldrs: Vec<String> = Vec::new();
    for record in records {
        all.decisions.extend(record.decisions);
        all.ideas.extend(record.ideas);
        all.questions.extend(record.questions);
        all.action_items.extend(record.action_items);
        all.concepts.extend(record.concepts);
        all.terms.extend(record.terms);
        if !record.tldr.is_empty() {
            tldrs.push(record.tldr);
        }
    }

    let mut merged = ExtractionRecord {
        decisions: dedupe_similar(all.decisions),
        ideas: dedupe_similar(all.ideas),
        questions: dedupe_similar(all.questions),
        action_items: dedupe_similar(all.action_items),
        concepts: dedupe_exact(all.concepts),
        terms: dedupe_exact(all.terms),
        ..Default::default()
    };

    // Cross-category pass: decisions are the source of truth.
    let decision_texts: Vec<String> = merged
        .decisions
        .iter()
        .map(|d| d.key_text().to_lowercase())
        .collect();
    merged.action_items = drop_restatements(merged.action_items, &decision_texts);
    merged.ideas = drop_restatements(merged.ideas, &decision_texts);

    // Longest non-empty summary wins; first occurrence breaks ties.
    merged.tldr = tldrs
        .into_iter()
        .fold(String::new(), |best, t| if t.len() > best.len() { t } else { best });

    merged
}

/// Single forward pass: an item is dropped when its designated text is at
/// least [`SIMILARITY_THRESHOLD`]-similar to any already-kept item.
fn dedupe_similar<T: KnowledgeItem>(items: Vec<T>) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let duplicate = kept
            .iter()
            .any(|k| similarity::ratio(item.key_text(), k.key_text()) >= SIMILARITY_THRESHOLD);
        if !duplicate {
            kept.push(item);
        }
    }
    kept
}

/// Drop items whose text restates any reference text (case-insensitive).
fn drop_restatements<T: KnowledgeItem>(items: Vec<T>, reference: &[String]) -> Vec<T> {
    if reference.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            let text = item.key_text().to_lowercase();
            !reference
                .iter()
                .any(|r| similarity::ratio(&text, r) >= SIMILARITY_THRESHOLD)
        })
        .collect()
}

/// Exact case-sensitive dedup on the designated key; first occurrence wins.
fn dedupe_exact<T: KnowledgeItem>(items: Vec<T>) -> Vec<T> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| seen.insert(item.key_text().to_string()))
        .collect()
}
