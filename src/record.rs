//! Typed knowledge items extracted from a transcript.
//!
//! Every field except the designated text of each item is optional on the
//! wire: extraction collaborators routinely omit fields, so all structs
//! deserialize from partial JSON via `#[serde(default)]`.

use serde::{Deserialize, Serialize};

/// A decision made during the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// What was decided.
    pub summary: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub date: String,
}

/// An idea or suggestion discussed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    /// Short idea name.
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

/// An open question or topic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub owner: String,
}

/// Something to do after the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub deadline: String,
}

/// A key concept discussed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub definition: String,
}

/// A technical term or abbreviation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub context: String,
}

/// The complete result of knowledge extraction from a chunk or session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub ideas: Vec<Idea>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub terms: Vec<Term>,
    /// 2-3 sentence summary of the whole session.
    #[serde(default)]
    pub tldr: String,
}

impl ExtractionRecord {
    /// Total number of items across all categories.
    pub fn item_count(&self) -> usize {
        self.decisions.len()
            + self.ideas.len()
            + self.questions.len()
            + self.action_items.len()
            + self.concepts.len()
            + self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0 && self.tldr.is_empty()
    }

    /// Flatten the record into row-shaped items for indexing, using the fixed
    /// category → field mapping.
    pub fn indexed_items(&self) -> Vec<IndexedFields> {
        let mut rows = Vec::with_capacity(self.item_count());
        for d in &self.decisions {
            rows.push(IndexedFields {
                category: ItemCategory::Decision,
                content: d.summary.clone(),
                detail: non_empty(&d.rationale),
                owner: non_empty(&d.owner),
                date: non_empty(&d.date),
            });
        }
        for i in &self.ideas {
            rows.push(IndexedFields {
                category: ItemCategory::Idea,
                content: i.title.clone(),
                detail: non_empty(&i.description),
                owner: None,
                date: None,
            });
        }
        for q in &self.questions {
            rows.push(IndexedFields {
                category: ItemCategory::Question,
                content: q.text.clone(),
                detail: non_empty(&q.context),
                owner: non_empty(&q.owner),
                date: None,
            });
        }
        for a in &self.action_items {
            rows.push(IndexedFields {
                category: ItemCategory::ActionItem,
                content: a.description.clone(),
                detail: None,
                owner: non_empty(&a.owner),
                date: non_empty(&a.deadline),
            });
        }
        for c in &self.concepts {
            rows.push(IndexedFields {
                category: ItemCategory::Concept,
                content: c.name.clone(),
                detail: non_empty(&c.definition),
                owner: None,
                date: None,
            });
        }
        for t in &self.terms {
            rows.push(IndexedFields {
                category: ItemCategory::Term,
                content: t.term.clone(),
                detail: non_empty(&t.definition),
                owner: None,
                date: None,
            });
        }
        rows
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Uniform access to the designated text of an item — the field dedup and
/// indexing both key on.
pub trait KnowledgeItem {
    fn key_text(&self) -> &str;
}

impl KnowledgeItem for Decision {
    fn key_text(&self) -> &str {
        &self.summary
    }
}

impl KnowledgeItem for Idea {
    fn key_text(&self) -> &str {
        &self.title
    }
}

impl KnowledgeItem for Question {
    fn key_text(&self) -> &str {
        &self.text
    }
}

impl KnowledgeItem for ActionItem {
    fn key_text(&self) -> &str {
        &self.description
    }
}

impl KnowledgeItem for Concept {
    fn key_text(&self) -> &str {
        &self.name
    }
}

impl KnowledgeItem for Term {
    fn key_text(&self) -> &str {
        &self.term
    }
}

/// Closed set of item categories. The database stores the `as_str` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemCategory {
    Decision,
    Idea,
    Question,
    ActionItem,
    Concept,
    Term,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 6] = [
        ItemCategory::Decision,
        ItemCategory::Idea,
        ItemCategory::Question,
        ItemCategory::ActionItem,
        ItemCategory::Concept,
        ItemCategory::Term,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Decision => "decision",
            ItemCategory::Idea => "idea",
            ItemCategory::Question => "question",
            ItemCategory::ActionItem => "action_item",
            ItemCategory::Concept => "concept",
            ItemCategory::Term => "term",
        }
    }

    pub fn parse(value: &str) -> Option<ItemCategory> {
        Self::ALL.iter().copied().find(|c| c.as_str() == value)
    }
}

impl std::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-shaped item ready for the index writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedFields {
    pub category: ItemCategory,
    pub content: String,
    pub detail: Option<String>,
    pub owner: Option<String>,
    pub date: Option<String>,
}
