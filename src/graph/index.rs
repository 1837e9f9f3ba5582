//! In-memory knowledge graph.
//!
//! Uses `petgraph` for the multigraph itself (one node per concept, node index ==
//! concept ID) and two compressed neighbor tables, sorted and deduplicated, for
//! the hot loops of path enumeration.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::LoadError;
use crate::vocab::{ConceptId, RelationId, RelationVocab};

use super::{EdgeData, GraphVariant, KnowledgeEdge};

/// Result type for graph construction.
pub type GraphResult<T> = std::result::Result<T, LoadError>;

/// Compressed sparse rows: `targets[offsets[c]..offsets[c + 1]]` are the unique
/// neighbors of concept `c`, in ascending ID order.
#[derive(Debug, Clone, Default)]
struct NeighborTable {
    offsets: Vec<usize>,
    targets: Vec<ConceptId>,
}

impl NeighborTable {
    fn build(num_concepts: usize, mut pairs: Vec<(u32, u32)>) -> Self {
        pairs.sort_unstable();
        pairs.dedup();

        let mut offsets = vec![0usize; num_concepts + 1];
        for &(from, _) in &pairs {
            offsets[from as usize + 1] += 1;
        }
        for i in 0..num_concepts {
            offsets[i + 1] += offsets[i];
        }
        let targets = pairs.into_iter().map(|(_, to)| ConceptId(to)).collect();
        Self { offsets, targets }
    }

    fn get(&self, concept: ConceptId) -> &[ConceptId] {
        let i = concept.index();
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&start), Some(&end)) => &self.targets[start..end],
            _ => &[],
        }
    }
}

/// Read-only knowledge graph over a dense concept ID space.
pub struct KnowledgeGraph {
    graph: DiGraph<(), EdgeData>,
    relations: RelationVocab,
    variant: GraphVariant,
    out_neighbors: NeighborTable,
    in_neighbors: NeighborTable,
}

impl KnowledgeGraph {
    /// Build a graph from a list of edges, validating every ID.
    pub fn from_edges(
        num_concepts: usize,
        relations: RelationVocab,
        variant: GraphVariant,
        edges: impl IntoIterator<Item = KnowledgeEdge>,
    ) -> GraphResult<Self> {
        let mut builder = KnowledgeGraphBuilder::new(num_concepts, relations, variant);
        for edge in edges {
            builder.add_edge(edge)?;
        }
        Ok(builder.build())
    }

    /// Number of concepts (nodes), connected or not.
    pub fn num_concepts(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges, inverse copies included.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn variant(&self) -> GraphVariant {
        self.variant
    }

    pub fn relations(&self) -> &RelationVocab {
        &self.relations
    }

    pub fn contains(&self, concept: ConceptId) -> bool {
        concept.index() < self.num_concepts()
    }

    /// Unique neighbors of a concept in the given direction, ascending.
    pub fn neighbors(&self, concept: ConceptId, direction: Direction) -> &[ConceptId] {
        match direction {
            Direction::Outgoing => self.out_neighbors.get(concept),
            Direction::Incoming => self.in_neighbors.get(concept),
        }
    }

    pub fn successors(&self, concept: ConceptId) -> &[ConceptId] {
        self.out_neighbors.get(concept)
    }

    pub fn predecessors(&self, concept: ConceptId) -> &[ConceptId] {
        self.in_neighbors.get(concept)
    }

    /// Whether at least one edge `head -> tail` exists.
    pub fn has_edge(&self, head: ConceptId, tail: ConceptId) -> bool {
        self.successors(head).binary_search(&tail).is_ok()
    }

    /// All edges `head -> tail` with their relation and weight, ordered by relation.
    pub fn edges_between(&self, head: ConceptId, tail: ConceptId) -> Vec<EdgeData> {
        if !self.contains(head) || !self.contains(tail) {
            return vec![];
        }
        let mut edges: Vec<EdgeData> = self
            .graph
            .edges_connecting(NodeIndex::new(head.index()), NodeIndex::new(tail.index()))
            .map(|e| *e.weight())
            .collect();
        edges.sort_by_key(|e| e.relation);
        edges
    }

    /// Distinct relations on the edges `head -> tail`, ascending.
    pub fn relations_between(&self, head: ConceptId, tail: ConceptId) -> Vec<RelationId> {
        let mut rels: Vec<RelationId> = self
            .edges_between(head, tail)
            .into_iter()
            .map(|e| e.relation)
            .collect();
        rels.dedup();
        rels
    }

    /// Iterate over every edge in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = KnowledgeEdge> + '_ {
        self.graph.edge_references().map(|e| {
            let data = e.weight();
            KnowledgeEdge {
                head: ConceptId(e.source().index() as u32),
                relation: data.relation,
                tail: ConceptId(e.target().index() as u32),
                weight: data.weight,
                merged: data.merged,
            }
        })
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("variant", &self.variant)
            .field("concepts", &self.num_concepts())
            .field("edges", &self.edge_count())
            .field("relations", &self.relations.len())
            .finish()
    }
}

/// Accumulates edges and freezes them into a [`KnowledgeGraph`].
///
/// Duplicate `(head, tail, relation)` edges are dropped on insertion.
pub struct KnowledgeGraphBuilder {
    num_concepts: usize,
    relations: RelationVocab,
    variant: GraphVariant,
    edges: Vec<KnowledgeEdge>,
    seen: HashSet<(u32, u32, u16)>,
}

impl KnowledgeGraphBuilder {
    pub fn new(num_concepts: usize, relations: RelationVocab, variant: GraphVariant) -> Self {
        Self {
            num_concepts,
            relations,
            variant,
            edges: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn relations(&self) -> &RelationVocab {
        &self.relations
    }

    /// Add an edge. Returns `false` if the same edge was already present.
    pub fn add_edge(&mut self, edge: KnowledgeEdge) -> GraphResult<bool> {
        for concept in [edge.head, edge.tail] {
            if concept.index() >= self.num_concepts {
                return Err(LoadError::ConceptOutOfRange {
                    concept: concept.0,
                    vocab_size: self.num_concepts,
                });
            }
        }
        if !self.relations.contains(edge.relation) {
            return Err(LoadError::RelationOutOfRange {
                relation: edge.relation.0,
                relation_count: self.relations.len(),
            });
        }
        if !self.seen.insert((edge.head.0, edge.tail.0, edge.relation.0)) {
            return Ok(false);
        }
        self.edges.push(edge);
        Ok(true)
    }

    /// Number of distinct edges added so far.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Freeze into a read-only graph.
    pub fn build(self) -> KnowledgeGraph {
        let mut graph = DiGraph::with_capacity(self.num_concepts, self.edges.len());
        for _ in 0..self.num_concepts {
            graph.add_node(());
        }

        let mut forward = Vec::with_capacity(self.edges.len());
        let mut backward = Vec::with_capacity(self.edges.len());
        for edge in &self.edges {
            graph.add_edge(
                NodeIndex::new(edge.head.index()),
                NodeIndex::new(edge.tail.index()),
                edge.data(),
            );
            forward.push((edge.head.0, edge.tail.0));
            backward.push((edge.tail.0, edge.head.0));
        }

        KnowledgeGraph {
            graph,
            relations: self.relations,
            variant: self.variant,
            out_neighbors: NeighborTable::build(self.num_concepts, forward),
            in_neighbors: NeighborTable::build(self.num_concepts, backward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::RelationInfo;

    fn c(id: u32) -> ConceptId {
        ConceptId(id)
    }

    fn two_relations() -> RelationVocab {
        RelationVocab::custom(
            vec![
                RelationInfo {
                    name: "isa".into(),
                    symmetric: false,
                },
                RelationInfo {
                    name: "relatedto".into(),
                    symmetric: true,
                },
            ],
            true,
        )
    }

    #[test]
    fn insert_and_query() {
        let kg = KnowledgeGraph::from_edges(
            4,
            two_relations(),
            GraphVariant::Unpruned,
            [
                KnowledgeEdge::new(c(0), RelationId(0), c(1)).with_weight(2.0),
                KnowledgeEdge::new(c(0), RelationId(1), c(1)),
                KnowledgeEdge::new(c(1), RelationId(2), c(0)),
                KnowledgeEdge::new(c(0), RelationId(0), c(3)),
            ],
        )
        .unwrap();

        assert_eq!(kg.num_concepts(), 4);
        assert_eq!(kg.edge_count(), 4);
        assert_eq!(kg.successors(c(0)), &[c(1), c(3)]);
        assert_eq!(kg.predecessors(c(1)), &[c(0)]);
        assert_eq!(kg.neighbors(c(1), Direction::Outgoing), &[c(0)]);
        assert!(kg.successors(c(2)).is_empty());

        assert_eq!(
            kg.relations_between(c(0), c(1)),
            vec![RelationId(0), RelationId(1)]
        );
        let edges = kg.edges_between(c(0), c(1));
        assert_eq!(edges.len(), 2);
        assert!((edges[0].weight - 2.0).abs() < f32::EPSILON);
        assert!(kg.has_edge(c(1), c(0)));
        assert!(!kg.has_edge(c(3), c(0)));
    }

    #[test]
    fn duplicate_edges_are_dropped() {
        let mut builder = KnowledgeGraphBuilder::new(2, two_relations(), GraphVariant::Pruned);
        assert!(builder.add_edge(KnowledgeEdge::new(c(0), RelationId(0), c(1))).unwrap());
        assert!(!builder.add_edge(KnowledgeEdge::new(c(0), RelationId(0), c(1))).unwrap());
        assert!(builder.add_edge(KnowledgeEdge::new(c(0), RelationId(1), c(1))).unwrap());
        assert_eq!(builder.len(), 2);
        let kg = builder.build();
        assert_eq!(kg.variant(), GraphVariant::Pruned);
        assert_eq!(kg.successors(c(0)), &[c(1)]);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut builder = KnowledgeGraphBuilder::new(2, two_relations(), GraphVariant::Pruned);
        let err = builder
            .add_edge(KnowledgeEdge::new(c(0), RelationId(0), c(5)))
            .unwrap_err();
        assert!(matches!(err, LoadError::ConceptOutOfRange { concept: 5, .. }));

        let err = builder
            .add_edge(KnowledgeEdge::new(c(0), RelationId(9), c(1)))
            .unwrap_err();
        assert!(matches!(err, LoadError::RelationOutOfRange { relation: 9, .. }));
    }

    #[test]
    fn queries_outside_the_graph_are_empty() {
        let kg = KnowledgeGraph::from_edges(1, two_relations(), GraphVariant::Pruned, []).unwrap();
        assert!(kg.successors(c(10)).is_empty());
        assert!(kg.edges_between(c(0), c(10)).is_empty());
        assert!(!kg.has_edge(c(10), c(0)));
    }

    #[test]
    fn edges_round_trip_through_iteration() {
        let input = [
            KnowledgeEdge::new(c(0), RelationId(0), c(1)).with_weight(0.5),
            KnowledgeEdge::new(c(1), RelationId(1), c(0)).merged(),
        ];
        let kg = KnowledgeGraph::from_edges(2, two_relations(), GraphVariant::Pruned, input).unwrap();
        let edges: Vec<_> = kg.edges().collect();
        assert_eq!(edges, input.to_vec());
    }
}
