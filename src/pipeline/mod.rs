//! Staged preprocessing pipeline.
//!
//! Stages run in a fixed order, each persisting one record per example so that
//! a run can resume stage by stage:
//!
//! ```text
//! assertions -> extract-conceptnet -> build-kg (unpruned, pruned)
//! grounded -> find-paths -> score-paths -> prune-paths -> build-graph
//!          -> extract-triples, relational-paths
//! grounded -> build-two-hop
//! ```
//!
//! A stage whose outputs already exist is skipped (and logged) unless the run
//! is forced.

pub mod io;
pub mod pool;
pub mod stages;

use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::graph::GraphVariant;
use crate::graph::store::KnowledgeStore;
use crate::layout::DataLayout;

pub use pool::WorkerPool;
pub use stages::{Embeddings, StageReport};

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractConceptnet,
    BuildKnowledgeGraph,
    FindPaths,
    ScorePaths,
    PrunePaths,
    BuildGraph,
    BuildTwoHop,
    ExtractTriples,
    RelationalPaths,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::ExtractConceptnet => "extract-conceptnet",
            Stage::BuildKnowledgeGraph => "build-kg",
            Stage::FindPaths => "find-paths",
            Stage::ScorePaths => "score-paths",
            Stage::PrunePaths => "prune-paths",
            Stage::BuildGraph => "build-graph",
            Stage::BuildTwoHop => "build-two-hop",
            Stage::ExtractTriples => "extract-triples",
            Stage::RelationalPaths => "relational-paths",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Take the value out of `slot`, loading it first if needed.
fn get_or_load<T, E>(slot: &mut Option<T>, load: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
    let value = match slot.take() {
        Some(value) => value,
        None => load()?,
    };
    Ok(slot.insert(value))
}

/// Runs every stage for a dataset, resuming from existing outputs.
pub struct Pipeline {
    config: PipelineConfig,
    layout: DataLayout,
    pool: WorkerPool,
    force: bool,
    store: Option<KnowledgeStore>,
    embeddings: Option<Embeddings>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, force: bool) -> PipelineResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.nprocs)?;
        Ok(Self {
            layout: DataLayout::new(&config),
            config,
            pool,
            force,
            store: None,
            embeddings: None,
        })
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Whether `stage` has to run: some output is missing or the run is forced.
    fn pending(&self, stage: Stage, scope: &str, outputs: &[PathBuf]) -> bool {
        if self.force {
            return true;
        }
        if outputs.iter().all(|p| p.exists()) {
            tracing::info!(%stage, scope, "outputs exist, skipping stage");
            return false;
        }
        true
    }

    /// Run the knowledge-base stages (extraction, then both graph variants), then
    /// every stage for each split in order. Path and schema-graph stages use the
    /// pruned graph.
    pub fn run(&mut self, dataset: &str, splits: &[String]) -> PipelineResult<Vec<StageReport>> {
        self.layout.ensure_dirs(dataset)?;
        let kb = self.layout.kb();
        let ds = self.layout.dataset(dataset);
        let kb_name = self.config.kb.clone();
        let mut reports = Vec::new();

        if self.pending(
            Stage::ExtractConceptnet,
            &kb_name,
            &[kb.english_csv.clone(), kb.vocab.clone()],
        ) {
            reports.push(stages::extract_conceptnet(
                &kb.assertions,
                &kb.english_csv,
                &kb.vocab,
            )?);
        }
        for variant in [GraphVariant::Unpruned, GraphVariant::Pruned] {
            let output = kb.graph(variant);
            let scope = format!("{kb_name} {variant}");
            if self.pending(Stage::BuildKnowledgeGraph, &scope, &[output.clone()]) {
                reports.push(stages::build_knowledge_graph(
                    &kb.english_csv,
                    &kb.vocab,
                    &output,
                    self.config.graph_build(variant == GraphVariant::Pruned),
                )?);
            }
        }
        let graph_path = kb.graph(GraphVariant::Pruned);

        for split in splits {
            let split = split.as_str();
            tracing::info!(dataset, split, "processing split");
            let grounded = ds.grounded(split);

            if self.pending(Stage::FindPaths, split, &[ds.raw_paths(split)]) {
                let store = get_or_load(&mut self.store, || {
                    KnowledgeStore::load(&graph_path, &kb.vocab)
                })?;
                reports.push(stages::find_paths(
                    &self.pool,
                    store,
                    &grounded,
                    &ds.raw_paths(split),
                    self.config.path_finder(),
                )?);
            }

            if self.pending(Stage::ScorePaths, split, &[ds.scored_paths(split)]) {
                let store = get_or_load(&mut self.store, || {
                    KnowledgeStore::load(&graph_path, &kb.vocab)
                })?;
                let embeddings = get_or_load(&mut self.embeddings, || {
                    Embeddings::load(&kb.entity_embeddings(), &kb.relation_embeddings())
                })?;
                reports.push(stages::score_paths(
                    &self.pool,
                    store.graph.relations(),
                    embeddings,
                    &ds.raw_paths(split),
                    &ds.scored_paths(split),
                    self.config.score_aggregation,
                )?);
            }

            if self.pending(Stage::PrunePaths, split, &[ds.pruned_paths(split)]) {
                reports.push(stages::prune_paths(
                    &ds.scored_paths(split),
                    &ds.pruned_paths(split),
                    self.config.path_prune_threshold,
                )?);
            }

            if self.pending(
                Stage::BuildGraph,
                split,
                &[ds.graph(split), ds.adjacency(split)],
            ) {
                let store = get_or_load(&mut self.store, || {
                    KnowledgeStore::load(&graph_path, &kb.vocab)
                })?;
                reports.push(stages::build_graph(
                    &self.pool,
                    store,
                    &grounded,
                    &ds.pruned_paths(split),
                    &ds.graph(split),
                    &ds.adjacency(split),
                    self.config.subgraph(),
                )?);
            }

            if self.pending(
                Stage::BuildTwoHop,
                split,
                &[ds.two_hop_graph(split), ds.two_hop_adjacency(split)],
            ) {
                let store = get_or_load(&mut self.store, || {
                    KnowledgeStore::load(&graph_path, &kb.vocab)
                })?;
                reports.push(stages::build_two_hop(
                    &self.pool,
                    store,
                    &grounded,
                    &ds.two_hop_graph(split),
                    &ds.two_hop_adjacency(split),
                    self.config.subgraph(),
                )?);
            }

            if self.pending(Stage::ExtractTriples, split, &[ds.triples(split)]) {
                reports.push(stages::extract_triples(
                    &self.pool,
                    &ds.graph(split),
                    &ds.adjacency(split),
                    &ds.triples(split),
                )?);
            }

            if self.pending(Stage::RelationalPaths, split, &[ds.relational_paths(split)]) {
                reports.push(stages::extract_relational_paths(
                    &self.pool,
                    &ds.graph(split),
                    &ds.adjacency(split),
                    &ds.relational_paths(split),
                    self.config.relational_path_max_hops,
                )?);
            }
        }
        Ok(reports)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layout", &self.layout)
            .field("threads", &self.pool.threads())
            .field("force", &self.force)
            .field("store_loaded", &self.store.is_some())
            .finish()
    }
}
