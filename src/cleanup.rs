//! Post-extraction normalization of merged records.
//!
//! Extraction collaborators pad records with generic owners ("the team"),
//! filler rationales ("no particular reason"), and dates that never appear in
//! the transcript. This pass strips those so the index only carries grounded
//! fields.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::ExtractionRecord;

static BAD_OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(team|lead|committee|panel|board|management|department|division|manager|developer|engineer|architect|analyst|reviewer|group)\b",
    )
    .expect("bad owner regex")
});

static VALID_OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^$|^user$|^assistant$|^[A-Z][a-z]+(\s[A-Z][a-z]+)*$").expect("valid owner regex")
});

static FILLER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^no (particular|specific|explicit|clear|stated|given|documented)\b",
        r"(?i)^not (specified|mentioned|stated|discussed|provided|given|documented)\b",
        r"(?i)^none (provided|given|stated|mentioned|specified)\b",
        r"(?i)^straightforward\b",
        r"(?i)^n/?a$",
        r"(?i)^(no|none|n/?a|tbd|unknown|unspecified)$",
        r"(?i)^implicit\b",
        r"(?i)^(just|simply)\s+(a\s+)?(decision|choice|standard)\b",
        r"(?i)no debate",
        r"(?i)no (particular |specific )?reason(ing)?\b",
        r"(?i)^it'?s (just )?(what|how) we",
        r"(?i)^(standard|default|common|obvious) (choice|decision|approach)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("filler regex"))
    .collect()
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{4,}\b").expect("word regex"));

/// Normalize owners, strip filler, and drop ungrounded details and dates in
/// place.
pub fn normalize(record: &mut ExtractionRecord, transcript: &str) {
    for d in &mut record.decisions {
        d.owner = clean_owner(&d.owner);
        d.rationale = clean_filler(&d.rationale);
        if !transcript.is_empty() {
            d.rationale = clean_ungrounded(&d.rationale, transcript);
            d.date = clean_date(&d.date, transcript);
        }
    }
    for q in &mut record.questions {
        q.owner = clean_owner(&q.owner);
        q.context = clean_filler(&q.context);
        if !transcript.is_empty() {
            q.context = clean_ungrounded(&q.context, transcript);
        }
    }
    for a in &mut record.action_items {
        a.owner = clean_owner(&a.owner);
        if !transcript.is_empty() {
            a.deadline = clean_date(&a.deadline, transcript);
        }
    }
}

fn clean_owner(value: &str) -> String {
    if value.is_empty() || VALID_OWNER_RE.is_match(value) {
        return value.to_string();
    }
    if BAD_OWNER_RE.is_match(value) {
        return String::new();
    }
    // All-lowercase owners are generic descriptions, not names.
    if value == value.to_lowercase() {
        return String::new();
    }
    value.to_string()
}

fn clean_filler(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if FILLER_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        return String::new();
    }
    value.to_string()
}

/// A detail is kept only when most of its substantive words actually occur in
/// the transcript.
fn clean_ungrounded(value: &str, transcript: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let words: Vec<String> = WORD_RE
        .find_iter(value)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if words.is_empty() {
        return value.to_string();
    }
    let transcript_lower = transcript.to_lowercase();
    let grounded = words
        .iter()
        .filter(|w| transcript_lower.contains(w.as_str()))
        .count();
    if (grounded as f64) / (words.len() as f64) < 0.6 {
        return String::new();
    }
    value.to_string()
}

fn clean_date(value: &str, transcript: &str) -> String {
    if value.is_empty() || transcript.contains(value) {
        value.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ActionItem, Decision};

    #[test]
    fn generic_owners_are_cleared() {
        assert_eq!(clean_owner("the development team"), "");
        assert_eq!(clean_owner("lead engineer"), "");
        assert_eq!(clean_owner("somebody"), "");
    }

    #[test]
    fn real_names_and_roles_survive() {
        assert_eq!(clean_owner("Ada Lovelace"), "Ada Lovelace");
        assert_eq!(clean_owner("user"), "user");
        assert_eq!(clean_owner("assistant"), "assistant");
        assert_eq!(clean_owner(""), "");
    }

    #[test]
    fn filler_rationales_are_stripped() {
        assert_eq!(clean_filler("No particular reason given"), "");
        assert_eq!(clean_filler("n/a"), "");
        assert_eq!(clean_filler("TBD"), "");
        assert_eq!(
            clean_filler("Postgres handles our write volume"),
            "Postgres handles our write volume"
        );
    }

    #[test]
    fn ungrounded_details_are_dropped() {
        let transcript = "We compared postgres and sqlite for write volume.";
        assert_eq!(
            clean_ungrounded("postgres wins on write volume", transcript),
            "postgres wins on write volume"
        );
        assert_eq!(
            clean_ungrounded("kubernetes operator licensing concerns", transcript),
            ""
        );
    }

    #[test]
    fn dates_must_appear_in_transcript() {
        let transcript = "Ship it by 2025-04-01 at the latest.";
        assert_eq!(clean_date("2025-04-01", transcript), "2025-04-01");
        assert_eq!(clean_date("2026-01-01", transcript), "");
    }

    #[test]
    fn normalize_touches_all_categories() {
        let transcript = "Talk about postgres. Deadline Friday.";
        let mut record = ExtractionRecord {
            decisions: vec![Decision {
                summary: "Use postgres".into(),
                owner: "the team".into(),
                rationale: "no specific reason".into(),
                date: "2031-12-12".into(),
            }],
            action_items: vec![ActionItem {
                description: "Send notes".into(),
                owner: "committee".into(),
                deadline: "Friday".into(),
            }],
            ..Default::default()
        };
        normalize(&mut record, transcript);
        assert_eq!(record.decisions[0].owner, "");
        assert_eq!(record.decisions[0].rationale, "");
        assert_eq!(record.decisions[0].date, "");
        assert_eq!(record.action_items[0].owner, "");
        assert_eq!(record.action_items[0].deadline, "Friday");
    }
}
