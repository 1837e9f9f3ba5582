//! Reasoning paths between grounded concepts.
//!
//! - [`find`]: bounded simple-path enumeration with deterministic sampling
//! - [`score`]: translational-embedding plausibility of a path
//! - [`prune`]: threshold filtering of scored paths
//! - [`relational`]: relation sequences inside a per-example subgraph

pub mod find;
pub mod prune;
pub mod relational;
pub mod score;

use serde::{Deserialize, Serialize};

use crate::vocab::{ConceptId, RelationId};

pub use find::{PathFinder, PathFinderConfig, find_paths};
pub use prune::{prune_example, prune_paths};
pub use score::{PathScorer, ScoreAggregation, WORST_SCORE};

/// One path with the relations of every hop.
///
/// `rel[i]` lists every relation on the edges `path[i] -> path[i + 1]`, ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub path: Vec<ConceptId>,
    pub rel: Vec<Vec<RelationId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl PathRecord {
    /// Number of edges.
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All paths found for one `(qc, ac)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPaths {
    pub qc: ConceptId,
    pub ac: ConceptId,
    pub paths: Vec<PathRecord>,
}

/// Paths of one example, one entry per `(qc, ac)` pair in `qc x ac` order.
///
/// Serialized as a JSON array: one NDJSON line per example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExamplePaths {
    pub pairs: Vec<PairPaths>,
}

impl ExamplePaths {
    /// Total number of paths over all pairs.
    pub fn path_count(&self) -> usize {
        self.pairs.iter().map(|p| p.paths.len()).sum()
    }

    /// Every path of the example, pair by pair.
    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.pairs.iter().flat_map(|p| p.paths.iter())
    }
}
