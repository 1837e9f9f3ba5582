//! Relational paths inside a schema graph.
//!
//! For every (question node, answer node) pair of an example subgraph, lists the
//! distinct relation sequences along simple paths of at most `max_hops` edges.
//! A hop carrying several relations contributes every one of them, so a path
//! yields the Cartesian product of its hop relations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::traverse::{PathBounds, simple_paths};
use crate::graph::{GraphVariant, KnowledgeEdge, KnowledgeGraph};
use crate::subgraph::{ExampleSubgraph, NodeType};
use crate::vocab::{ConceptId, RelationId, RelationVocab};

/// Relation sequences between one question node and one answer node.
///
/// `qc` and `ac` are node indices into the subgraph's node list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalPair {
    pub qc: u32,
    pub ac: u32,
    pub rel_paths: Vec<Vec<RelationId>>,
}

/// Relational paths of one example. Serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationalPaths {
    pub pairs: Vec<RelationalPair>,
}

/// Index-space view of a subgraph's adjacency as a graph.
fn local_graph(subgraph: &ExampleSubgraph) -> Option<KnowledgeGraph> {
    let adjacency = &subgraph.adjacency;
    let edges = adjacency
        .nonzero()
        .iter()
        .map(|e| KnowledgeEdge::new(ConceptId(e.head), e.relation, ConceptId(e.tail)));
    // The adjacency was built within these bounds; a mismatch means a corrupt input.
    KnowledgeGraph::from_edges(
        adjacency.num_nodes().max(subgraph.nodes.len()),
        RelationVocab::anonymous(adjacency.num_relations()),
        GraphVariant::Unpruned,
        edges,
    )
    .ok()
}

/// Relation sequences for every question/answer node pair of the subgraph.
pub fn relational_paths(subgraph: &ExampleSubgraph, max_hops: usize) -> RelationalPaths {
    let Some(local) = local_graph(subgraph) else {
        tracing::warn!("adjacency references nodes outside the subgraph; no relational paths");
        return RelationalPaths::default();
    };
    let bounds = PathBounds::new(1, max_hops);

    let mut pairs = Vec::new();
    for q in subgraph.indices_of(NodeType::Question) {
        for a in subgraph.indices_of(NodeType::Answer) {
            let mut sequences: BTreeSet<Vec<RelationId>> = BTreeSet::new();
            for path in simple_paths(&local, ConceptId(q), ConceptId(a), bounds) {
                let hops: Vec<Vec<RelationId>> = path
                    .windows(2)
                    .map(|hop| local.relations_between(hop[0], hop[1]))
                    .collect();
                sequences.extend(cartesian(&hops));
            }
            pairs.push(RelationalPair {
                qc: q,
                ac: a,
                rel_paths: sequences.into_iter().collect(),
            });
        }
    }
    RelationalPaths { pairs }
}

fn cartesian(hops: &[Vec<RelationId>]) -> Vec<Vec<RelationId>> {
    hops.iter().fold(vec![Vec::new()], |prefixes, choices| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                choices.iter().map(move |&r| {
                    let mut next = prefix.clone();
                    next.push(r);
                    next
                })
            })
            .collect()
    })
}
