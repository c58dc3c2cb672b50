use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use campus_core::{CampusResult, KnowledgeIndex, RecordStore, Snippet};

/// In-memory record store, used for tests and the demo deployment.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(String, String), Value>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, entity_kind: &str, key: &str, value: Value) {
        self.records
            .write()
            .insert((entity_kind.to_string(), key.to_string()), value);
    }

    /// A store pre-seeded with a handful of demo students.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.insert(
            "tuition_status",
            "20220015",
            json!({"has_debt": false, "debt_amount": 0, "semester": "2026 Fall"}),
        );
        store.insert(
            "tuition_status",
            "20220016",
            json!({"has_debt": true, "debt_amount": 4500, "due_date": "2026-09-15", "semester": "2026 Fall"}),
        );
        store.insert(
            "academic_status",
            "20220015",
            json!({"gpa": 3.42, "standing": "good", "can_register": true}),
        );
        store.insert(
            "academic_status",
            "20220016",
            json!({"gpa": 1.85, "standing": "probation", "can_register": false}),
        );
        store.insert(
            "payment_history",
            "20220015",
            json!([
                {"date": "2026-02-10", "amount": 4500, "method": "bank transfer"},
                {"date": "2025-09-12", "amount": 4500, "method": "card"}
            ]),
        );
        store.insert(
            "scholarship",
            "20220015",
            json!({"active": true, "kind": "merit", "coverage": "50%"}),
        );
        store.insert(
            "library_card",
            "20220015",
            json!({"active": true, "expires": "2027-06-30", "loans": 2}),
        );
        store.insert(
            "account",
            "20220015",
            json!({"username": "jsmith15", "email": "jsmith15@campus.edu"}),
        );
        store
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn query(&self, entity_kind: &str, key: &str) -> CampusResult<Option<Value>> {
        Ok(self
            .records
            .read()
            .get(&(entity_kind.to_string(), key.to_string()))
            .cloned())
    }
}

/// Static snippet index with naive term-overlap scoring.
#[derive(Default)]
pub struct StaticKnowledgeIndex {
    entries: Vec<(String, Snippet)>,
}

impl StaticKnowledgeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a snippet to a collection.
    pub fn add(&mut self, collection: &str, source: &str, text: &str) {
        self.entries.push((
            collection.to_string(),
            Snippet {
                text: text.to_string(),
                source: source.to_string(),
                score: 0.0,
            },
        ));
    }

    /// An index pre-seeded with campus handbook entries and a small
    /// catalogue.
    pub fn seeded() -> Self {
        let mut index = Self::new();
        index.add(
            "handbook",
            "cafeteria.md",
            "The main cafeteria is open weekdays 08:00 to 19:00, weekends 10:00 to 16:00.",
        );
        index.add(
            "handbook",
            "housing.md",
            "Dormitory applications open in July; rooms are assigned by application date.",
        );
        index.add(
            "handbook",
            "registration.md",
            "Course registration runs through the student portal during the first two weeks of term.",
        );
        index.add(
            "catalogue",
            "QA-76",
            "The Rust Programming Language, Klabnik and Nichols. 3 copies, shelf QA-76.",
        );
        index.add(
            "catalogue",
            "PR-21",
            "Dune, Frank Herbert. 1 copy, shelf PR-21.",
        );
        index
    }
}

#[async_trait]
impl KnowledgeIndex for StaticKnowledgeIndex {
    async fn search(&self, query: &str, collection: &str) -> CampusResult<Vec<Snippet>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut hits: Vec<Snippet> = self
            .entries
            .iter()
            .filter(|(c, _)| c == collection)
            .filter_map(|(_, snippet)| {
                let text = snippet.text.to_lowercase();
                let overlap = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (overlap > 0).then(|| Snippet {
                    score: overlap as f32 / terms.len().max(1) as f32,
                    ..snippet.clone()
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}
