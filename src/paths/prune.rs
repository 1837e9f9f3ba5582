//! Threshold pruning of scored paths.

use super::score::WORST_SCORE;
use super::{ExamplePaths, PathRecord};

/// Default pruning threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.12;

/// Keep the paths whose score is at least `threshold`.
///
/// `scores[i]` belongs to `paths[i]`; paths without a score are dropped.
pub fn prune_paths(paths: &[PathRecord], scores: &[f32], threshold: f32) -> Vec<PathRecord> {
    paths
        .iter()
        .zip(scores)
        .filter(|(_, score)| **score >= threshold)
        .map(|(path, _)| path.clone())
        .collect()
}

/// Prune every pair of an example by the scores attached to its paths.
///
/// An unscored path counts as [`WORST_SCORE`]. Pairs are kept even when all of
/// their paths are removed.
pub fn prune_example(example: &ExamplePaths, threshold: f32) -> ExamplePaths {
    let mut pruned = example.clone();
    for pair in &mut pruned.pairs {
        let scores: Vec<f32> = pair
            .paths
            .iter()
            .map(|p| p.score.unwrap_or(WORST_SCORE))
            .collect();
        pair.paths = prune_paths(&pair.paths, &scores, threshold);
    }
    pruned
}
