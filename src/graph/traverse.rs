//! Bounded graph traversal.
//!
//! Provides BFS hop distances with a depth limit and depth-first enumeration of
//! simple paths between two concepts. Enumeration is pruned with the reverse
//! BFS distance to the target: a branch is only followed when the target is
//! still reachable within the remaining edge budget, which leaves the set of
//! enumerated paths unchanged while skipping the dead ends that dominate the
//! search on hub-heavy graphs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::ControlFlow;

use petgraph::Direction;

use crate::vocab::ConceptId;

use super::index::KnowledgeGraph;

/// Hop distances from `origin`, following edges in `direction`, up to `max_depth`.
///
/// With [`Direction::Incoming`] the result is the distance from every concept
/// *to* `origin`.
pub fn bounded_distances(
    graph: &KnowledgeGraph,
    origin: ConceptId,
    direction: Direction,
    max_depth: usize,
) -> HashMap<ConceptId, usize> {
    let mut dist: HashMap<ConceptId, usize> = HashMap::new();
    if !graph.contains(origin) {
        return dist;
    }
    dist.insert(origin, 0);

    // BFS queue: (node, current_depth)
    let mut queue: VecDeque<(ConceptId, usize)> = VecDeque::new();
    queue.push_back((origin, 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for &next in graph.neighbors(node, direction) {
            if !dist.contains_key(&next) {
                dist.insert(next, depth + 1);
                queue.push_back((next, depth + 1));
            }
        }
    }
    dist
}

/// Length bounds of a simple-path search, counted in edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBounds {
    pub min_len: usize,
    pub max_len: usize,
}

impl PathBounds {
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self { min_len, max_len }
    }

    pub fn admits(&self, edges: usize) -> bool {
        edges >= self.min_len && edges <= self.max_len
    }
}

/// Enumerate every simple directed path `source -> ... -> target` whose edge
/// count lies within `bounds`, calling `visit` with the concept sequence.
///
/// Paths are produced in a deterministic order: depth-first, neighbors in
/// ascending concept ID. `visit` may stop the enumeration early by returning
/// [`ControlFlow::Break`]. Returns the number of paths visited.
pub fn for_each_simple_path<F>(
    graph: &KnowledgeGraph,
    source: ConceptId,
    target: ConceptId,
    bounds: PathBounds,
    mut visit: F,
) -> usize
where
    F: FnMut(&[ConceptId]) -> ControlFlow<()>,
{
    if source == target || bounds.max_len == 0 || bounds.min_len > bounds.max_len {
        return 0;
    }
    let to_target = bounded_distances(graph, target, Direction::Incoming, bounds.max_len);
    if !to_target.contains_key(&source) {
        return 0;
    }

    let mut visited = 0usize;
    let mut path: Vec<ConceptId> = vec![source];
    let mut on_path: HashSet<ConceptId> = HashSet::from([source]);
    // One cursor per node on `path`: the next successor index to try.
    let mut cursors: Vec<usize> = vec![0];

    loop {
        let (Some(cursor), Some(&node)) = (cursors.last_mut(), path.last()) else {
            break;
        };
        let successors = graph.successors(node);
        if *cursor >= successors.len() {
            cursors.pop();
            if let Some(done) = path.pop() {
                on_path.remove(&done);
            }
            continue;
        }
        let next = successors[*cursor];
        *cursor += 1;

        // Edges on the path once `next` is appended.
        let edges = path.len();
        if next == target {
            if bounds.admits(edges) {
                path.push(next);
                visited += 1;
                let flow = visit(&path);
                path.pop();
                if flow.is_break() {
                    break;
                }
            }
            continue;
        }
        if on_path.contains(&next) {
            continue;
        }
        match to_target.get(&next) {
            Some(&remaining) if edges + remaining <= bounds.max_len => {
                path.push(next);
                on_path.insert(next);
                cursors.push(0);
            }
            _ => {}
        }
    }
    visited
}

/// Collect every simple path within `bounds`. Convenience wrapper for small graphs.
pub fn simple_paths(
    graph: &KnowledgeGraph,
    source: ConceptId,
    target: ConceptId,
    bounds: PathBounds,
) -> Vec<Vec<ConceptId>> {
    let mut paths = Vec::new();
    for_each_simple_path(graph, source, target, bounds, |p| {
        paths.push(p.to_vec());
        ControlFlow::Continue(())
    });
    paths
}
