//! Sparse per-relation adjacency of an example subgraph.
//!
//! Conceptually a `[relation][head][tail]` tensor over the subgraph's node
//! indices; stored as a sorted list of nonzero cells.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;
use crate::vocab::{ConceptId, RelationId};

/// Normalization applied to every relation slice of the adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// `a[i][j] / out_degree(i)`: every nonempty row sums to one.
    #[default]
    Row,
    /// `a[i][j] / sqrt(out_degree(i) * in_degree(j))`.
    Sym,
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Normalization::Row => write!(f, "row"),
            Normalization::Sym => write!(f, "sym"),
        }
    }
}

impl std::str::FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row" => Ok(Normalization::Row),
            "sym" => Ok(Normalization::Sym),
            other => Err(format!("unknown normalization {other:?}, expected row or sym")),
        }
    }
}

/// One nonzero cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjEntry {
    pub relation: RelationId,
    pub head: u32,
    pub tail: u32,
    pub value: f32,
}

impl AdjEntry {
    fn key(&self) -> (RelationId, u32, u32) {
        (self.relation, self.head, self.tail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseAdjacency {
    num_nodes: usize,
    num_relations: usize,
    entries: Vec<AdjEntry>,
}

impl SparseAdjacency {
    /// Every edge of `graph` between two nodes of the list, value 1.
    ///
    /// Node index `i` of the adjacency is `nodes[i]`.
    pub fn from_graph(graph: &KnowledgeGraph, nodes: &[ConceptId]) -> Self {
        let position: HashMap<ConceptId, u32> = nodes
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();

        let mut entries = Vec::new();
        for (i, &head) in nodes.iter().enumerate() {
            for tail in graph.successors(head) {
                let Some(&j) = position.get(tail) else {
                    continue;
                };
                for relation in graph.relations_between(head, *tail) {
                    entries.push(AdjEntry {
                        relation,
                        head: i as u32,
                        tail: j,
                        value: 1.0,
                    });
                }
            }
        }
        Self::from_entries(nodes.len(), graph.relations().len(), entries)
    }

    /// Build from raw cells. Cells are sorted by `(relation, head, tail)`, zero
    /// cells are dropped and duplicate cells keep their first value.
    pub fn from_entries(num_nodes: usize, num_relations: usize, mut entries: Vec<AdjEntry>) -> Self {
        entries.retain(|e| e.value != 0.0);
        entries.sort_by_key(AdjEntry::key);
        entries.dedup_by_key(|e| e.key());
        Self {
            num_nodes,
            num_relations,
            entries,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_relations(&self) -> usize {
        self.num_relations
    }

    /// Nonzero cells, ordered by `(relation, head, tail)`.
    pub fn nonzero(&self) -> &[AdjEntry] {
        &self.entries
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of a cell, zero if absent.
    pub fn get(&self, relation: RelationId, head: u32, tail: u32) -> f32 {
        self.entries
            .binary_search_by_key(&(relation, head, tail), AdjEntry::key)
            .map(|i| self.entries[i].value)
            .unwrap_or(0.0)
    }

    /// Normalize every relation slice independently.
    pub fn normalize(mut self, normalization: Normalization) -> Self {
        let mut out_degree: HashMap<(RelationId, u32), f32> = HashMap::new();
        let mut in_degree: HashMap<(RelationId, u32), f32> = HashMap::new();
        for e in &self.entries {
            *out_degree.entry((e.relation, e.head)).or_default() += e.value;
            *in_degree.entry((e.relation, e.tail)).or_default() += e.value;
        }
        for e in &mut self.entries {
            let out = out_degree[&(e.relation, e.head)];
            let denom = match normalization {
                Normalization::Row => out,
                Normalization::Sym => (out * in_degree[&(e.relation, e.tail)]).sqrt(),
            };
            if denom != 0.0 {
                e.value /= denom;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(relation: u16, head: u32, tail: u32) -> AdjEntry {
        AdjEntry {
            relation: RelationId(relation),
            head,
            tail,
            value: 1.0,
        }
    }

    #[test]
    fn entries_are_sorted_and_unique() {
        let adj = SparseAdjacency::from_entries(
            3,
            2,
            vec![cell(1, 0, 1), cell(0, 2, 1), cell(0, 0, 1), cell(0, 0, 1)],
        );
        assert_eq!(adj.nnz(), 3);
        assert_eq!(adj.nonzero()[0].key(), (RelationId(0), 0, 1));
        assert_eq!(adj.get(RelationId(1), 0, 1), 1.0);
        assert_eq!(adj.get(RelationId(1), 1, 0), 0.0);
    }

    #[test]
    fn row_normalization_sums_rows_to_one() {
        let adj = SparseAdjacency::from_entries(
            3,
            1,
            vec![cell(0, 0, 1), cell(0, 0, 2), cell(0, 1, 2)],
        )
        .normalize(Normalization::Row);
        assert!((adj.get(RelationId(0), 0, 1) - 0.5).abs() < 1e-6);
        assert!((adj.get(RelationId(0), 0, 2) - 0.5).abs() < 1e-6);
        assert!((adj.get(RelationId(0), 1, 2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sym_normalization_uses_both_degrees() {
        let adj = SparseAdjacency::from_entries(
            3,
            1,
            vec![cell(0, 0, 1), cell(0, 0, 2), cell(0, 1, 2)],
        )
        .normalize(Normalization::Sym);
        // out(0) = 2, in(2) = 2
        assert!((adj.get(RelationId(0), 0, 2) - 0.5).abs() < 1e-6);
        // out(0) = 2, in(1) = 1
        assert!((adj.get(RelationId(0), 0, 1) - 1.0 / 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn relations_are_normalized_independently() {
        let adj = SparseAdjacency::from_entries(2, 2, vec![cell(0, 0, 1), cell(1, 0, 1)])
            .normalize(Normalization::Row);
        assert_eq!(adj.get(RelationId(0), 0, 1), 1.0);
        assert_eq!(adj.get(RelationId(1), 0, 1), 1.0);
    }
}
