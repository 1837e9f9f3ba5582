//! Path finder: bounded simple paths between every question/answer pair.
//!
//! Enumeration is exhaustive and deterministic (see
//! [`for_each_simple_path`](crate::graph::traverse::for_each_simple_path)). When a
//! pair has more than `max_num_paths` paths, a reservoir sample of exactly that
//! size is kept, seeded from the run seed and the pair, and returned in
//! enumeration order.

use std::ops::ControlFlow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::KnowledgeGraph;
use crate::graph::traverse::{PathBounds, for_each_simple_path};
use crate::grounded::GroundedExample;
use crate::vocab::ConceptId;

use super::{ExamplePaths, PairPaths, PathRecord};

/// Parameters of the path search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathFinderConfig {
    pub min_len: usize,
    pub max_len: usize,
    pub max_num_paths: usize,
    pub seed: u64,
}

impl Default for PathFinderConfig {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 5,
            max_num_paths: 100,
            seed: 0,
        }
    }
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Sampling seed of one pair. Independent of worker assignment and of the other
/// pairs of the example.
fn pair_seed(seed: u64, q: ConceptId, a: ConceptId) -> u64 {
    mix(seed ^ mix(((q.0 as u64) << 32) | a.0 as u64))
}

/// Path search over a shared graph.
#[derive(Debug, Clone, Copy)]
pub struct PathFinder<'g> {
    graph: &'g KnowledgeGraph,
    config: PathFinderConfig,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g KnowledgeGraph, config: PathFinderConfig) -> Self {
        Self { graph, config }
    }

    pub fn config(&self) -> &PathFinderConfig {
        &self.config
    }

    /// Paths of one example, one entry per `(q, a)` pair in `qc x ac` order.
    ///
    /// A pair with `q == a` or without any path in bounds has an empty list.
    pub fn find(&self, example: &GroundedExample) -> ExamplePaths {
        let pairs = example
            .pairs()
            .map(|(q, a)| PairPaths {
                qc: q,
                ac: a,
                paths: self.pair_paths(q, a),
            })
            .collect();
        ExamplePaths { pairs }
    }

    /// Paths `source -> target`, sampled down to `max_num_paths`.
    pub fn pair_paths(&self, source: ConceptId, target: ConceptId) -> Vec<PathRecord> {
        let bounds = PathBounds::new(self.config.min_len, self.config.max_len);
        let cap = self.config.max_num_paths;
        if cap == 0 || !self.graph.contains(source) || !self.graph.contains(target) {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(pair_seed(self.config.seed, source, target));
        // (enumeration index, path)
        let mut reservoir: Vec<(usize, Vec<ConceptId>)> = Vec::new();
        let mut seen = 0usize;
        for_each_simple_path(self.graph, source, target, bounds, |path| {
            if reservoir.len() < cap {
                reservoir.push((seen, path.to_vec()));
            } else {
                let slot = rng.gen_range(0..=seen);
                if slot < cap {
                    reservoir[slot] = (seen, path.to_vec());
                }
            }
            seen += 1;
            ControlFlow::Continue(())
        });

        if seen > cap {
            tracing::debug!(%source, %target, found = seen, kept = cap, "sampled paths");
        }
        reservoir.sort_unstable_by_key(|(i, _)| *i);
        reservoir
            .into_iter()
            .map(|(_, path)| self.annotate(path))
            .collect()
    }

    fn annotate(&self, path: Vec<ConceptId>) -> PathRecord {
        let rel = path
            .windows(2)
            .map(|hop| self.graph.relations_between(hop[0], hop[1]))
            .collect();
        PathRecord {
            path,
            rel,
            score: None,
        }
    }
}

/// Find the paths of one example.
pub fn find_paths(
    example: &GroundedExample,
    graph: &KnowledgeGraph,
    config: PathFinderConfig,
) -> ExamplePaths {
    PathFinder::new(graph, config).find(example)
}
