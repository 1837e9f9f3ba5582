//! Concept and relation vocabularies.
//!
//! Concepts are identified by a [`ConceptId`]: the zero-based line number of the
//! concept in the vocabulary file. Relations are identified by a [`RelationId`]
//! into a small fixed [`RelationVocab`]. Both are assigned once per run and never
//! change afterwards, so every artifact of the pipeline can refer to them by
//! position.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Dense identifier of a concept: its position in the concept vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ConceptId(pub u32);

impl ConceptId {
    /// Position of this concept as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "concept:{}", self.0)
    }
}

/// Identifier of a relation type, including inverse relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RelationId(pub u16);

impl RelationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rel:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Concept vocabulary
// ---------------------------------------------------------------------------

/// Ordered list of unique concept strings with a reverse index.
#[derive(Debug, Clone, Default)]
pub struct ConceptVocab {
    concepts: Vec<String>,
    index: HashMap<String, ConceptId>,
}

impl ConceptVocab {
    /// Load a newline-delimited vocabulary. Line number = concept ID.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut concepts = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| LoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
            concepts.push(line.trim_end_matches('\r').to_string());
        }
        // A trailing empty line is an artifact of the writer, not a concept.
        while concepts.last().is_some_and(|c| c.is_empty()) {
            concepts.pop();
        }
        if concepts.is_empty() {
            return Err(LoadError::EmptyVocab {
                path: path.display().to_string(),
            });
        }
        Self::from_concepts(concepts)
    }

    /// Build a vocabulary from concepts in ID order.
    pub fn from_concepts<I, S>(concepts: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for (line, concept) in concepts.into_iter().enumerate() {
            let concept = concept.into();
            if vocab.index.contains_key(&concept) {
                return Err(LoadError::DuplicateConcept { concept, line });
            }
            let id = ConceptId(line as u32);
            vocab.index.insert(concept.clone(), id);
            vocab.concepts.push(concept);
        }
        Ok(vocab)
    }

    /// Write the vocabulary, one concept per line.
    pub fn write(&self, path: &Path) -> Result<(), LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        for concept in &self.concepts {
            writeln!(out, "{concept}").map_err(io_err)?;
        }
        out.flush().map_err(io_err)
    }

    /// Look up a concept string.
    pub fn get(&self, id: ConceptId) -> Option<&str> {
        self.concepts.get(id.index()).map(String::as_str)
    }

    /// Look up the ID of a concept string.
    pub fn lookup(&self, concept: &str) -> Option<ConceptId> {
        self.index.get(concept).copied()
    }

    pub fn contains(&self, id: ConceptId) -> bool {
        id.index() < self.concepts.len()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Label for display, falling back to the numeric ID.
    pub fn label(&self, id: ConceptId) -> String {
        self.get(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Relation vocabulary
// ---------------------------------------------------------------------------

/// The merged ConceptNet relations, in canonical ID order.
pub const MERGED_RELATIONS: [&str; 17] = [
    "antonym",
    "atlocation",
    "capableof",
    "causes",
    "createdby",
    "isa",
    "desires",
    "hassubevent",
    "partof",
    "hascontext",
    "hasproperty",
    "madeof",
    "notcapableof",
    "notdesires",
    "receivesaction",
    "relatedto",
    "usedfor",
];

/// Relations whose direction carries no meaning.
const SYMMETRIC_RELATIONS: [&str; 2] = ["antonym", "relatedto"];

/// A canonical relation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub name: String,
    /// Whether this relation was merged with its symmetric counterpart, so that
    /// `a -r-> b` and `b -r-> a` mean the same thing.
    pub symmetric: bool,
}

/// Fixed set of relation types.
///
/// IDs `0..canonical_count()` are the canonical relations. When the vocabulary
/// carries inverses, ID `r + canonical_count()` is the inverse of `r` and is used
/// for the reversed copy of every edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationVocab {
    relations: Vec<RelationInfo>,
    with_inverses: bool,
}

impl RelationVocab {
    /// The 17 merged ConceptNet relations plus their inverses (34 IDs).
    pub fn conceptnet() -> Self {
        let relations = MERGED_RELATIONS
            .iter()
            .map(|name| RelationInfo {
                name: (*name).to_string(),
                symmetric: SYMMETRIC_RELATIONS.contains(name),
            })
            .collect();
        Self {
            relations,
            with_inverses: true,
        }
    }

    /// A custom vocabulary. Used for toy graphs and per-example subgraphs.
    pub fn custom(relations: Vec<RelationInfo>, with_inverses: bool) -> Self {
        Self {
            relations,
            with_inverses,
        }
    }

    /// `count` unnamed, non-symmetric relations without inverses. Used to index
    /// adjacency tensors whose relation axis is already fixed.
    pub fn anonymous(count: usize) -> Self {
        let relations = (0..count)
            .map(|i| RelationInfo {
                name: format!("r{i}"),
                symmetric: false,
            })
            .collect();
        Self::custom(relations, false)
    }

    /// Number of canonical relations.
    pub fn canonical_count(&self) -> usize {
        self.relations.len()
    }

    /// Total number of relation IDs, inverses included.
    pub fn len(&self) -> usize {
        if self.with_inverses {
            self.relations.len() * 2
        } else {
            self.relations.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn has_inverses(&self) -> bool {
        self.with_inverses
    }

    pub fn contains(&self, id: RelationId) -> bool {
        id.index() < self.len()
    }

    /// ID of a canonical relation by name.
    pub fn lookup(&self, name: &str) -> Option<RelationId> {
        self.relations
            .iter()
            .position(|r| r.name == name)
            .map(|i| RelationId(i as u16))
    }

    /// The inverse relation ID of a canonical one.
    pub fn inverse_of(&self, id: RelationId) -> Option<RelationId> {
        (self.with_inverses && id.index() < self.relations.len())
            .then(|| RelationId(id.0 + self.relations.len() as u16))
    }

    /// Split an ID into its canonical relation and whether it is the inverse.
    pub fn canonical(&self, id: RelationId) -> (RelationId, bool) {
        let n = self.relations.len() as u16;
        if self.with_inverses && id.0 >= n {
            (RelationId(id.0 - n), true)
        } else {
            (id, false)
        }
    }

    pub fn info(&self, id: RelationId) -> Option<&RelationInfo> {
        let (canonical, _) = self.canonical(id);
        self.relations.get(canonical.index())
    }

    pub fn is_symmetric(&self, id: RelationId) -> bool {
        self.info(id).is_some_and(|r| r.symmetric)
    }

    /// Human-readable name; inverses are prefixed with `~`.
    pub fn name(&self, id: RelationId) -> String {
        match (self.info(id), self.canonical(id)) {
            (Some(info), (_, false)) => info.name.clone(),
            (Some(info), (_, true)) => format!("~{}", info.name),
            (None, _) => id.to_string(),
        }
    }
}

impl Default for RelationVocab {
    fn default() -> Self {
        Self::conceptnet()
    }
}
