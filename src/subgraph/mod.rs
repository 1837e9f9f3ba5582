//! Per-example schema graphs.
//!
//! A schema graph is the small subgraph of the knowledge graph that a downstream
//! graph network reasons over: the grounded question and answer concepts plus
//! the concepts connecting them, with every knowledge-graph edge among those
//! nodes as a normalized per-relation adjacency.
//!
//! Node order is fixed: question concepts, then answer concepts, then the other
//! concepts in first-seen order. A question concept that is also an answer
//! concept is an answer.

pub mod adjacency;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;
use crate::grounded::GroundedExample;
use crate::paths::ExamplePaths;
use crate::vocab::ConceptId;

pub use adjacency::{AdjEntry, Normalization, SparseAdjacency};

/// Role of a node in the schema graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeType {
    Question = 0,
    Answer = 1,
    Other = 2,
}

impl From<NodeType> for u8 {
    fn from(t: NodeType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for NodeType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(NodeType::Question),
            1 => Ok(NodeType::Answer),
            2 => Ok(NodeType::Other),
            other => Err(format!("invalid node type {other}")),
        }
    }
}

/// The schema graph of one example.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExampleSubgraph {
    pub nodes: Vec<ConceptId>,
    pub node_types: Vec<NodeType>,
    pub adjacency: SparseAdjacency,
    /// Candidate nodes dropped to respect the node cap.
    pub truncated: usize,
}

/// The NDJSON half of a stored schema graph; the adjacency is stored separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub nodes: Vec<ConceptId>,
    pub node_types: Vec<NodeType>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub truncated: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ExampleSubgraph {
    pub fn record(&self) -> GraphRecord {
        GraphRecord {
            nodes: self.nodes.clone(),
            node_types: self.node_types.clone(),
            truncated: self.truncated,
        }
    }

    pub fn from_parts(record: GraphRecord, adjacency: SparseAdjacency) -> Self {
        Self {
            nodes: record.nodes,
            node_types: record.node_types,
            adjacency,
            truncated: record.truncated,
        }
    }

    /// Node indices of the given type.
    pub fn indices_of(&self, kind: NodeType) -> impl Iterator<Item = u32> + '_ {
        self.node_types
            .iter()
            .enumerate()
            .filter(move |(_, t)| **t == kind)
            .map(|(i, _)| i as u32)
    }
}

/// Parameters shared by both builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgraphConfig {
    pub max_node_num: usize,
    pub normalization: Normalization,
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        Self {
            max_node_num: 200,
            normalization: Normalization::Row,
        }
    }
}

/// A non-endpoint candidate node: its distance to the closest path endpoint and
/// its first-seen position.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    concept: ConceptId,
    distance: usize,
    first_seen: usize,
}

/// Builds schema graphs over a shared knowledge graph.
#[derive(Debug, Clone, Copy)]
pub struct SchemaGraphBuilder<'g> {
    graph: &'g KnowledgeGraph,
    config: SubgraphConfig,
}

impl<'g> SchemaGraphBuilder<'g> {
    pub fn new(graph: &'g KnowledgeGraph, config: SubgraphConfig) -> Self {
        Self { graph, config }
    }

    /// Schema graph over the grounded concepts and the intermediates of the
    /// pruned paths.
    pub fn build_from_paths(&self, example: &GroundedExample, paths: &ExamplePaths) -> ExampleSubgraph {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut slot: HashMap<ConceptId, usize> = HashMap::new();
        for record in paths.paths() {
            let last = record.path.len().saturating_sub(1);
            for (i, &concept) in record.path.iter().enumerate() {
                let distance = i.min(last - i);
                match slot.get(&concept) {
                    Some(&s) => {
                        let c = &mut candidates[s];
                        c.distance = c.distance.min(distance);
                    }
                    None => {
                        slot.insert(concept, candidates.len());
                        candidates.push(Candidate {
                            concept,
                            distance,
                            first_seen: candidates.len(),
                        });
                    }
                }
            }
        }
        self.assemble(example, candidates)
    }

    /// Schema graph over the grounded concepts and every concept adjacent to both
    /// a question concept and an answer concept, in ID order.
    pub fn build_two_hop(&self, example: &GroundedExample) -> ExampleSubgraph {
        let neighborhood = |concepts: &[ConceptId]| -> HashSet<ConceptId> {
            concepts
                .iter()
                .flat_map(|&c| {
                    self.graph
                        .successors(c)
                        .iter()
                        .chain(self.graph.predecessors(c))
                        .copied()
                })
                .collect()
        };
        let from_question = neighborhood(&example.qc);
        let from_answer = neighborhood(&example.ac);
        let mut shared: Vec<ConceptId> = from_question.intersection(&from_answer).copied().collect();
        shared.sort_unstable();

        let candidates = shared
            .into_iter()
            .enumerate()
            .map(|(i, concept)| Candidate {
                concept,
                distance: 1,
                first_seen: i,
            })
            .collect();
        self.assemble(example, candidates)
    }

    /// Order, cap and type the nodes, then extract the normalized adjacency.
    fn assemble(&self, example: &GroundedExample, candidates: Vec<Candidate>) -> ExampleSubgraph {
        let answers: Vec<ConceptId> = dedup(&example.ac);
        let answer_set: HashSet<ConceptId> = answers.iter().copied().collect();
        let questions: Vec<ConceptId> = dedup(&example.qc)
            .into_iter()
            .filter(|c| !answer_set.contains(c))
            .collect();

        let cap = self.config.max_node_num;
        let mut nodes: Vec<ConceptId> = Vec::new();
        let mut node_types: Vec<NodeType> = Vec::new();
        for (group, kind) in [(&questions, NodeType::Question), (&answers, NodeType::Answer)] {
            nodes.extend(group.iter().copied());
            node_types.extend(std::iter::repeat_n(kind, group.len()));
        }

        let endpoints: HashSet<ConceptId> = nodes.iter().copied().collect();
        let mut others: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !endpoints.contains(&c.concept))
            .collect();

        let mut truncated = 0;
        if nodes.len() > cap {
            truncated = nodes.len() - cap + others.len();
            nodes.truncate(cap);
            node_types.truncate(cap);
            others.clear();
        } else if nodes.len() + others.len() > cap {
            let budget = cap - nodes.len();
            truncated = others.len() - budget;
            others.sort_by_key(|c| (c.distance, c.first_seen));
            others.truncate(budget);
            others.sort_by_key(|c| c.first_seen);
        }
        if truncated > 0 {
            tracing::debug!(
                kept = nodes.len() + others.len(),
                dropped = truncated,
                cap,
                "truncated schema graph"
            );
        }

        node_types.extend(std::iter::repeat_n(NodeType::Other, others.len()));
        nodes.extend(others.into_iter().map(|c| c.concept));

        let adjacency =
            SparseAdjacency::from_graph(self.graph, &nodes).normalize(self.config.normalization);
        ExampleSubgraph {
            nodes,
            node_types,
            adjacency,
            truncated,
        }
    }
}

fn dedup(concepts: &[ConceptId]) -> Vec<ConceptId> {
    let mut seen = HashSet::new();
    concepts.iter().copied().filter(|c| seen.insert(*c)).collect()
}
