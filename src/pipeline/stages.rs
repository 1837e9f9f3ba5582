//! Stage implementations.
//!
//! Each stage reads the artifacts of the previous one, maps every example on the
//! worker pool, and writes its output atomically once all examples succeeded.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::embedding::EmbeddingMatrix;
use crate::error::{PipelineResult, StageError};
use crate::graph::conceptnet::{self, ExtractReport, GraphBuildOptions};
use crate::graph::store::{self, KnowledgeStore};
use crate::grounded::{GroundedExample, GroundedRecord};
use crate::paths::relational::{RelationalPaths, relational_paths};
use crate::paths::{ExamplePaths, PathFinder, PathFinderConfig, PathScorer, ScoreAggregation, prune_example};
use crate::subgraph::{ExampleSubgraph, GraphRecord, SchemaGraphBuilder, SparseAdjacency, SubgraphConfig};
use crate::triples::TripleRecord;
use crate::vocab::{ConceptVocab, RelationVocab};

use super::Stage;
use super::io::{
    AtomicFile, StageResult, bincode_file, ndjson_file, read_bincode, read_ndjson, write_bincode,
    write_ndjson,
};
use super::pool::WorkerPool;

/// Outcome of one stage run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// Examples processed.
    pub examples: usize,
    /// Stage-specific item count: paths, nodes, triples or edges.
    pub items: usize,
    pub elapsed: Duration,
}

impl StageReport {
    fn finish(stage: Stage, examples: usize, items: usize, started: Instant) -> Self {
        let elapsed = started.elapsed();
        tracing::info!(
            stage = %stage,
            examples,
            items,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );
        Self {
            stage,
            examples,
            items,
            elapsed,
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".partial");
    PathBuf::from(p)
}

fn rename(from: &Path, to: &Path) -> StageResult<()> {
    std::fs::rename(from, to).map_err(|source| StageError::Io {
        path: to.display().to_string(),
        source,
    })
}

fn check_aligned(stage: Stage, expected: usize, actual: usize) -> StageResult<()> {
    if expected != actual {
        return Err(StageError::LengthMismatch {
            stage: stage.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Knowledge-base stages
// ---------------------------------------------------------------------------

/// Extract English assertions and the concept vocabulary from a raw dump.
pub fn extract_conceptnet(
    assertions: &Path,
    english_csv: &Path,
    vocab: &Path,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let (csv_partial, vocab_partial) = (partial_path(english_csv), partial_path(vocab));
    let report: ExtractReport =
        match conceptnet::extract_english(assertions, &csv_partial, &vocab_partial) {
            Ok(report) => report,
            Err(e) => {
                let _ = std::fs::remove_file(&csv_partial);
                let _ = std::fs::remove_file(&vocab_partial);
                return Err(e.into());
            }
        };
    // The vocabulary is moved first: a CSV in place always has its vocabulary.
    let moved = rename(&vocab_partial, vocab).and_then(|()| rename(&csv_partial, english_csv));
    if let Err(e) = moved {
        let _ = std::fs::remove_file(&csv_partial);
        let _ = std::fs::remove_file(&vocab_partial);
        return Err(e.into());
    }
    Ok(StageReport::finish(
        Stage::ExtractConceptnet,
        report.assertions_kept,
        report.concepts,
        started,
    ))
}

/// Build a knowledge graph from the English CSV and store it.
pub fn build_knowledge_graph(
    english_csv: &Path,
    vocab_path: &Path,
    output: &Path,
    options: GraphBuildOptions,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let vocab = ConceptVocab::load(vocab_path)?;
    let graph = conceptnet::construct_graph(english_csv, &vocab, options)?;
    let bytes = store::encode_graph(&graph)?;

    let mut out = AtomicFile::create(output)?;
    out.write_all(&bytes)?;
    out.commit()?;
    Ok(StageReport::finish(
        Stage::BuildKnowledgeGraph,
        0,
        graph.edge_count(),
        started,
    ))
}

// ---------------------------------------------------------------------------
// Path stages
// ---------------------------------------------------------------------------

/// Read grounded examples, resolving concepts against the vocabulary.
pub fn load_grounded(path: &Path, vocab: &ConceptVocab) -> StageResult<Vec<GroundedExample>> {
    let records: Vec<GroundedRecord> = read_ndjson(path)?;
    let mut unknown_total = 0usize;
    let examples = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (example, unknown) = GroundedExample::resolve(record, vocab);
            if !unknown.is_empty() {
                tracing::warn!(index, ?unknown, "skipping concepts missing from the vocabulary");
                unknown_total += unknown.len();
            }
            example
        })
        .collect();
    if unknown_total > 0 {
        tracing::warn!(path = %path.display(), unknown_total, "grounded file mentions unknown concepts");
    }
    Ok(examples)
}

pub fn find_paths(
    pool: &WorkerPool,
    store: &KnowledgeStore,
    grounded: &Path,
    output: &Path,
    config: PathFinderConfig,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let examples = load_grounded(grounded, &store.vocab)?;
    tracing::info!(
        examples = examples.len(),
        threads = pool.threads(),
        min_len = config.min_len,
        max_len = config.max_len,
        max_num_paths = config.max_num_paths,
        "finding paths"
    );

    let finder = PathFinder::new(&store.graph, config);
    let results = pool.map_ordered(Stage::FindPaths.name(), &examples, |_, example| {
        Ok(finder.find(example))
    })?;
    let paths = results.iter().map(ExamplePaths::path_count).sum();
    write_ndjson(output, &results)?;
    Ok(StageReport::finish(Stage::FindPaths, results.len(), paths, started))
}

/// Embeddings shared by the scoring workers.
#[derive(Debug)]
pub struct Embeddings {
    pub entities: EmbeddingMatrix,
    pub relations: EmbeddingMatrix,
}

impl Embeddings {
    pub fn load(entities: &Path, relations: &Path) -> PipelineResult<Self> {
        Ok(Self {
            entities: EmbeddingMatrix::load_npy(entities)?,
            relations: EmbeddingMatrix::load_npy(relations)?,
        })
    }
}

pub fn score_paths(
    pool: &WorkerPool,
    relations: &RelationVocab,
    embeddings: &Embeddings,
    input: &Path,
    output: &Path,
    aggregation: ScoreAggregation,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let examples: Vec<ExamplePaths> = read_ndjson(input)?;
    let scorer = PathScorer::new(
        &embeddings.entities,
        &embeddings.relations,
        relations,
        aggregation,
    );
    let scored = pool.map_ordered(Stage::ScorePaths.name(), &examples, |_, example| {
        Ok(scorer.score_example(example))
    })?;
    let paths = scored.iter().map(ExamplePaths::path_count).sum();
    write_ndjson(output, &scored)?;
    Ok(StageReport::finish(Stage::ScorePaths, scored.len(), paths, started))
}

pub fn prune_paths(input: &Path, output: &Path, threshold: f32) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let examples: Vec<ExamplePaths> = read_ndjson(input)?;
    let before: usize = examples.iter().map(ExamplePaths::path_count).sum();
    let pruned: Vec<ExamplePaths> = examples
        .iter()
        .map(|example| prune_example(example, threshold))
        .collect();
    let kept = pruned.iter().map(ExamplePaths::path_count).sum();
    tracing::info!(before, kept, threshold, "pruned paths");
    write_ndjson(output, &pruned)?;
    Ok(StageReport::finish(Stage::PrunePaths, pruned.len(), kept, started))
}

// ---------------------------------------------------------------------------
// Graph stages
// ---------------------------------------------------------------------------

fn write_subgraphs(
    subgraphs: &[ExampleSubgraph],
    graph_out: &Path,
    adj_out: &Path,
) -> StageResult<usize> {
    let records: Vec<GraphRecord> = subgraphs.iter().map(ExampleSubgraph::record).collect();
    let adjacencies: Vec<&SparseAdjacency> = subgraphs.iter().map(|s| &s.adjacency).collect();
    let graph_file = ndjson_file(graph_out, &records)?;
    let adj_file = bincode_file(adj_out, &adjacencies)?;
    AtomicFile::commit_all(vec![graph_file, adj_file])?;

    let truncated = subgraphs.iter().filter(|s| s.truncated > 0).count();
    if truncated > 0 {
        tracing::info!(truncated, "examples hit the node cap");
    }
    Ok(subgraphs.iter().map(|s| s.nodes.len()).sum())
}

/// Read stored schema graphs back.
pub fn load_subgraphs(graph_jsonl: &Path, adj_bin: &Path) -> StageResult<Vec<ExampleSubgraph>> {
    let records: Vec<GraphRecord> = read_ndjson(graph_jsonl)?;
    let adjacencies: Vec<SparseAdjacency> = read_bincode(adj_bin)?;
    if records.len() != adjacencies.len() {
        return Err(StageError::LengthMismatch {
            stage: format!("load {}", adj_bin.display()),
            expected: records.len(),
            actual: adjacencies.len(),
        });
    }
    Ok(records
        .into_iter()
        .zip(adjacencies)
        .map(|(record, adjacency)| ExampleSubgraph::from_parts(record, adjacency))
        .collect())
}

/// Schema graphs from grounded concepts and pruned paths.
pub fn build_graph(
    pool: &WorkerPool,
    store: &KnowledgeStore,
    grounded: &Path,
    pruned: &Path,
    graph_out: &Path,
    adj_out: &Path,
    config: SubgraphConfig,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let examples = load_grounded(grounded, &store.vocab)?;
    let paths: Vec<ExamplePaths> = read_ndjson(pruned)?;
    check_aligned(Stage::BuildGraph, examples.len(), paths.len())?;

    let builder = SchemaGraphBuilder::new(&store.graph, config);
    let subgraphs = pool.map_ordered(Stage::BuildGraph.name(), &examples, |index, example| {
        Ok(builder.build_from_paths(example, &paths[index]))
    })?;
    let nodes = write_subgraphs(&subgraphs, graph_out, adj_out)?;
    Ok(StageReport::finish(Stage::BuildGraph, subgraphs.len(), nodes, started))
}

/// Schema graphs from grounded concepts and their shared neighbors.
pub fn build_two_hop(
    pool: &WorkerPool,
    store: &KnowledgeStore,
    grounded: &Path,
    graph_out: &Path,
    adj_out: &Path,
    config: SubgraphConfig,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let examples = load_grounded(grounded, &store.vocab)?;
    let builder = SchemaGraphBuilder::new(&store.graph, config);
    let subgraphs = pool.map_ordered(Stage::BuildTwoHop.name(), &examples, |_, example| {
        Ok(builder.build_two_hop(example))
    })?;
    let nodes = write_subgraphs(&subgraphs, graph_out, adj_out)?;
    Ok(StageReport::finish(Stage::BuildTwoHop, subgraphs.len(), nodes, started))
}

pub fn extract_triples(
    pool: &WorkerPool,
    graph_jsonl: &Path,
    adj_bin: &Path,
    output: &Path,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let subgraphs = load_subgraphs(graph_jsonl, adj_bin)?;
    let records = pool.map_ordered(Stage::ExtractTriples.name(), &subgraphs, |_, sg| {
        Ok(TripleRecord::new(&sg.adjacency, &sg.nodes))
    })?;
    let triples = records.iter().map(|r| r.triples.len()).sum();
    write_bincode(output, &records)?;
    Ok(StageReport::finish(Stage::ExtractTriples, records.len(), triples, started))
}

pub fn extract_relational_paths(
    pool: &WorkerPool,
    graph_jsonl: &Path,
    adj_bin: &Path,
    output: &Path,
    max_hops: usize,
) -> PipelineResult<StageReport> {
    let started = Instant::now();
    let subgraphs = load_subgraphs(graph_jsonl, adj_bin)?;
    let results: Vec<RelationalPaths> =
        pool.map_ordered(Stage::RelationalPaths.name(), &subgraphs, |_, sg| {
            Ok(relational_paths(sg, max_hops))
        })?;
    let sequences = results
        .iter()
        .flat_map(|r| &r.pairs)
        .map(|p| p.rel_paths.len())
        .sum();
    write_ndjson(output, &results)?;
    Ok(StageReport::finish(Stage::RelationalPaths, results.len(), sequences, started))
}
