//! Knowledge graph: a read-only directed multigraph over concept IDs.
//!
//! - **In-memory layer** ([`KnowledgeGraph`]): `petgraph` storage plus sorted
//!   neighbor tables for fast bounded traversals
//! - **Persistent layer** ([`store`]): versioned binary graph files and the
//!   [`KnowledgeStore`](store::KnowledgeStore) that pairs a graph with its vocabulary
//! - **Construction** ([`conceptnet`]): English extraction and graph building from
//!   ConceptNet assertion dumps
//!
//! The graph is built once and never mutated afterwards, so it can be shared by
//! reference with every worker without locking.

pub mod conceptnet;
pub mod index;
pub mod store;
pub mod traverse;

use serde::{Deserialize, Serialize};

use crate::vocab::{ConceptId, RelationId};

pub use index::{KnowledgeGraph, KnowledgeGraphBuilder};

/// Which flavour of the knowledge graph a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphVariant {
    /// Every extracted assertion, with a separate inverse relation for each edge.
    Unpruned,
    /// Low-confidence and stopword edges removed, symmetric relations merged.
    Pruned,
}

impl std::fmt::Display for GraphVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphVariant::Unpruned => write!(f, "unpruned"),
            GraphVariant::Pruned => write!(f, "pruned"),
        }
    }
}

/// Edge data stored on petgraph edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    /// The relation of this edge.
    pub relation: RelationId,
    /// Source confidence of the assertion.
    pub weight: f32,
    /// The edge is the reversed copy of a symmetric relation stored under the
    /// canonical ID instead of the inverse ID.
    pub merged: bool,
}

/// A single edge (head, relation, tail) with its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub head: ConceptId,
    pub relation: RelationId,
    pub tail: ConceptId,
    pub weight: f32,
    pub merged: bool,
}

impl KnowledgeEdge {
    /// Create an edge with full confidence.
    pub fn new(head: ConceptId, relation: RelationId, tail: ConceptId) -> Self {
        Self {
            head,
            relation,
            tail,
            weight: 1.0,
            merged: false,
        }
    }

    /// Set the source confidence.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Mark this edge as the merged reverse of a symmetric relation.
    pub fn merged(mut self) -> Self {
        self.merged = true;
        self
    }

    pub(crate) fn data(&self) -> EdgeData {
        EdgeData {
            relation: self.relation,
            weight: self.weight,
            merged: self.merged,
        }
    }
}
