//! Grounded examples: the question and answer concepts of one QA instance.

use serde::{Deserialize, Serialize};

use crate::vocab::{ConceptId, ConceptVocab};

/// A concept reference as written by the grounding step: a vocabulary ID or the
/// concept string itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConceptRef {
    Id(u32),
    Name(String),
}

/// One line of a grounded NDJSON file. Fields other than `qc` and `ac` (the
/// statement text, the answer string) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedRecord {
    #[serde(default)]
    pub qc: Vec<ConceptRef>,
    #[serde(default)]
    pub ac: Vec<ConceptRef>,
}

/// Question and answer concepts of one example, resolved to IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundedExample {
    pub qc: Vec<ConceptId>,
    pub ac: Vec<ConceptId>,
}

impl GroundedExample {
    pub fn new(qc: Vec<ConceptId>, ac: Vec<ConceptId>) -> Self {
        Self { qc, ac }
    }

    /// Resolve a record against the vocabulary.
    ///
    /// Unknown names and out-of-range IDs are dropped and returned alongside the
    /// example so the caller can report them. Duplicates keep their first position.
    pub fn resolve(record: &GroundedRecord, vocab: &ConceptVocab) -> (Self, Vec<String>) {
        let mut unknown = Vec::new();
        let mut resolve_all = |refs: &[ConceptRef]| {
            let mut ids: Vec<ConceptId> = Vec::with_capacity(refs.len());
            for r in refs {
                let id = match r {
                    ConceptRef::Id(id) => Some(ConceptId(*id)).filter(|c| vocab.contains(*c)),
                    ConceptRef::Name(name) => vocab.lookup(name),
                };
                match id {
                    Some(id) if !ids.contains(&id) => ids.push(id),
                    Some(_) => {}
                    None => unknown.push(match r {
                        ConceptRef::Id(id) => id.to_string(),
                        ConceptRef::Name(name) => name.clone(),
                    }),
                }
            }
            ids
        };
        let qc = resolve_all(&record.qc);
        let ac = resolve_all(&record.ac);
        (Self { qc, ac }, unknown)
    }

    /// Every `(q, a)` pair in `qc x ac` order.
    pub fn pairs(&self) -> impl Iterator<Item = (ConceptId, ConceptId)> + '_ {
        self.qc
            .iter()
            .flat_map(move |&q| self.ac.iter().map(move |&a| (q, a)))
    }

    pub fn is_empty(&self) -> bool {
        self.qc.is_empty() && self.ac.is_empty()
    }
}
