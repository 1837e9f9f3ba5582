//! Path scoring with translational (TransE) embeddings.
//!
//! A hop `h -r-> t` is plausible when `h + r ≈ t`, i.e. when `r` points the same
//! way as `t - h`. Each relation of a hop is scored as `(1 + cos(r, t - h)) / 2`
//! in `[0, 1]`; inverse relations use the canonical vector with head and tail
//! swapped, and symmetric relations take the better of both directions. A hop
//! scores the maximum over its relations, and the hop scores are combined by a
//! [`ScoreAggregation`].

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingMatrix;
use crate::error::ScoreError;
use crate::vocab::{ConceptId, RelationId, RelationVocab};

use super::{ExamplePaths, PathRecord};

/// Score given to paths that cannot be scored.
pub const WORST_SCORE: f32 = 0.0;

/// How per-hop scores combine into a path score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreAggregation {
    /// Product of hop scores. Longer paths score lower.
    #[default]
    Product,
    /// Arithmetic mean of hop scores.
    Mean,
    /// The weakest hop.
    Min,
}

impl std::fmt::Display for ScoreAggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreAggregation::Product => write!(f, "product"),
            ScoreAggregation::Mean => write!(f, "mean"),
            ScoreAggregation::Min => write!(f, "min"),
        }
    }
}

impl std::str::FromStr for ScoreAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(ScoreAggregation::Product),
            "mean" => Ok(ScoreAggregation::Mean),
            "min" => Ok(ScoreAggregation::Min),
            other => Err(format!("unknown aggregation {other:?}, expected product, mean or min")),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = (na * nb).sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Scores paths against shared entity and relation embeddings.
#[derive(Debug, Clone, Copy)]
pub struct PathScorer<'e> {
    entities: &'e EmbeddingMatrix,
    relations: &'e EmbeddingMatrix,
    vocab: &'e RelationVocab,
    aggregation: ScoreAggregation,
}

impl<'e> PathScorer<'e> {
    pub fn new(
        entities: &'e EmbeddingMatrix,
        relations: &'e EmbeddingMatrix,
        vocab: &'e RelationVocab,
        aggregation: ScoreAggregation,
    ) -> Self {
        Self {
            entities,
            relations,
            vocab,
            aggregation,
        }
    }

    fn entity(&self, c: ConceptId) -> Result<&'e [f32], ScoreError> {
        self.entities
            .row(c.index())
            .ok_or(ScoreError::MissingConceptEmbedding { concept: c.0 })
    }

    /// `(1 + cos(r, t - h)) / 2` for one relation.
    fn triple_score(&self, head: ConceptId, rel: RelationId, tail: ConceptId) -> Result<f32, ScoreError> {
        let (canonical, inverted) = self.vocab.canonical(rel);
        let r = self
            .relations
            .row(canonical.index())
            .ok_or(ScoreError::MissingRelationEmbedding { relation: rel.0 })?;
        let (h, t) = if inverted { (tail, head) } else { (head, tail) };
        let (hv, tv) = (self.entity(h)?, self.entity(t)?);

        let forward: Vec<f32> = tv.iter().zip(hv).map(|(t, h)| t - h).collect();
        let mut score = (1.0 + cosine(r, &forward)) / 2.0;
        if self.vocab.is_symmetric(canonical) {
            let backward: Vec<f32> = forward.iter().map(|x| -x).collect();
            score = score.max((1.0 + cosine(r, &backward)) / 2.0);
        }
        Ok(score)
    }

    /// Score of a whole path.
    pub fn score(&self, path: &PathRecord) -> Result<f32, ScoreError> {
        let hops = path.len();
        if hops == 0 || path.rel.len() < hops {
            return Err(ScoreError::EmptyHop {
                hop: path.rel.len().min(hops),
            });
        }

        let mut hop_scores = Vec::with_capacity(hops);
        for (hop, (pair, rels)) in path.path.windows(2).zip(&path.rel).enumerate() {
            if rels.is_empty() {
                return Err(ScoreError::EmptyHop { hop });
            }
            let mut best = f32::NEG_INFINITY;
            for &r in rels {
                best = best.max(self.triple_score(pair[0], r, pair[1])?);
            }
            hop_scores.push(best);
        }

        Ok(match self.aggregation {
            ScoreAggregation::Product => hop_scores.iter().product(),
            ScoreAggregation::Mean => hop_scores.iter().sum::<f32>() / hop_scores.len() as f32,
            ScoreAggregation::Min => hop_scores.iter().copied().fold(f32::INFINITY, f32::min),
        })
    }

    /// Score of a path, or [`WORST_SCORE`] with a warning if it cannot be scored.
    pub fn score_or_worst(&self, path: &PathRecord) -> f32 {
        match self.score(path) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(error = %e, path = ?path.path, "scoring path with worst score");
                WORST_SCORE
            }
        }
    }

    /// Attach a score to every path of an example.
    pub fn score_example(&self, example: &ExamplePaths) -> ExamplePaths {
        let mut scored = example.clone();
        for pair in &mut scored.pairs {
            for path in &mut pair.paths {
                path.score = Some(self.score_or_worst(path));
            }
        }
        scored
    }
}
