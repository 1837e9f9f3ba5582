//! Triple extraction from schema-graph adjacencies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::subgraph::SparseAdjacency;
use crate::vocab::{ConceptId, RelationId};

/// `(head node index, relation, tail node index)`.
pub type Triple = (u32, RelationId, u32);

/// One triple per nonzero adjacency cell. Node indices refer to `nodes`; cells
/// outside the node list are skipped.
pub fn extract(adjacency: &SparseAdjacency, nodes: &[ConceptId]) -> BTreeSet<Triple> {
    let n = nodes.len() as u32;
    adjacency
        .nonzero()
        .iter()
        .filter(|e| e.head < n && e.tail < n)
        .map(|e| (e.head, e.relation, e.tail))
        .collect()
}

/// Stored triples of one example, with the concepts their node indices refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleRecord {
    pub concepts: Vec<ConceptId>,
    pub triples: Vec<Triple>,
}

impl TripleRecord {
    pub fn new(adjacency: &SparseAdjacency, nodes: &[ConceptId]) -> Self {
        Self {
            concepts: nodes.to_vec(),
            triples: extract(adjacency, nodes).into_iter().collect(),
        }
    }

    /// Triples with node indices resolved to concept IDs.
    pub fn concept_triples(&self) -> impl Iterator<Item = (ConceptId, RelationId, ConceptId)> + '_ {
        self.triples.iter().filter_map(|&(h, r, t)| {
            Some((
                *self.concepts.get(h as usize)?,
                r,
                *self.concepts.get(t as usize)?,
            ))
        })
    }
}
