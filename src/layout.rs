//! On-disk layout of pipeline artifacts.
//!
//! Knowledge-base files live under `<data>/<kb>/`, embeddings under
//! `<data>/transe/`, and dataset artifacts under `<data>/<dataset>_<kb>/`, with
//! path, graph and triple directories suffixed by the path-search settings so
//! that runs with different settings never overwrite each other.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::graph::GraphVariant;

/// Errors from layout resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum LayoutError {
    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(kgpath::layout::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type LayoutResult<T> = std::result::Result<T, LayoutError>;

/// Knowledge-base artifacts shared by every dataset.
#[derive(Debug, Clone)]
pub struct KbPaths {
    /// `data/<kb>/`
    pub root: PathBuf,
    /// Raw ConceptNet assertions dump.
    pub assertions: PathBuf,
    /// Extracted English assertions.
    pub english_csv: PathBuf,
    /// Concept vocabulary.
    pub vocab: PathBuf,
    /// `data/transe/`
    pub transe_dir: PathBuf,
    kb: String,
}

impl KbPaths {
    /// Binary graph file of a variant.
    pub fn graph(&self, variant: GraphVariant) -> PathBuf {
        self.root.join(format!("{}.en.{variant}.graph", self.kb))
    }

    /// TransE entity embeddings.
    pub fn entity_embeddings(&self) -> PathBuf {
        self.transe_dir
            .join(format!("glove.transe.{}.sgd.ent.npy", self.kb))
    }

    /// TransE relation embeddings.
    pub fn relation_embeddings(&self) -> PathBuf {
        self.transe_dir
            .join(format!("glove.transe.{}.sgd.rel.npy", self.kb))
    }
}

/// Artifacts of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    /// `data/<dataset>_<kb>/`
    pub root: PathBuf,
    /// `root/grounded/`
    pub grounded_dir: PathBuf,
    /// `root/paths_<min>_<max>_<num>/`
    pub paths_dir: PathBuf,
    /// `root/graph_<min>_<max>_<num>/`
    pub graph_dir: PathBuf,
    /// `root/triples_<min>_<max>_<num>/`
    pub triples_dir: PathBuf,
}

impl DatasetPaths {
    pub fn grounded(&self, split: &str) -> PathBuf {
        self.grounded_dir.join(format!("{split}.grounded.jsonl"))
    }

    pub fn raw_paths(&self, split: &str) -> PathBuf {
        self.paths_dir.join(format!("{split}.paths.raw.jsonl"))
    }

    pub fn scored_paths(&self, split: &str) -> PathBuf {
        self.paths_dir.join(format!("{split}.paths.scores.jsonl"))
    }

    pub fn pruned_paths(&self, split: &str) -> PathBuf {
        self.paths_dir.join(format!("{split}.paths.pruned.jsonl"))
    }

    pub fn relational_paths(&self, split: &str) -> PathBuf {
        self.paths_dir.join(format!("{split}.relpaths.jsonl"))
    }

    pub fn graph(&self, split: &str) -> PathBuf {
        self.graph_dir.join(format!("{split}.graph.jsonl"))
    }

    pub fn adjacency(&self, split: &str) -> PathBuf {
        self.graph_dir.join(format!("{split}.graph.adj.bin"))
    }

    pub fn two_hop_graph(&self, split: &str) -> PathBuf {
        self.graph_dir.join(format!("{split}.2hop.jsonl"))
    }

    pub fn two_hop_adjacency(&self, split: &str) -> PathBuf {
        self.graph_dir.join(format!("{split}.2hop.adj.bin"))
    }

    pub fn triples(&self, split: &str) -> PathBuf {
        self.triples_dir.join(format!("{split}.triples.bin"))
    }
}

/// Resolves every artifact path of a run.
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
    kb: String,
    suffix: String,
}

impl DataLayout {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            kb: config.kb.clone(),
            suffix: format!(
                "{}_{}_{}",
                config.min_path_length, config.max_path_length, config.max_num_paths
            ),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn kb(&self) -> KbPaths {
        let root = self.data_dir.join(&self.kb);
        KbPaths {
            assertions: root.join("conceptnet-assertions.csv"),
            english_csv: root.join(format!("{}.en.csv", self.kb)),
            vocab: root.join("concept.txt"),
            transe_dir: self.data_dir.join("transe"),
            root,
            kb: self.kb.clone(),
        }
    }

    pub fn dataset(&self, dataset: &str) -> DatasetPaths {
        let root = self.data_dir.join(format!("{dataset}_{}", self.kb));
        DatasetPaths {
            grounded_dir: root.join("grounded"),
            paths_dir: root.join(format!("paths_{}", self.suffix)),
            graph_dir: root.join(format!("graph_{}", self.suffix)),
            triples_dir: root.join(format!("triples_{}", self.suffix)),
            root,
        }
    }

    /// Create the knowledge-base and dataset directories. Idempotent.
    pub fn ensure_dirs(&self, dataset: &str) -> LayoutResult<()> {
        let kb = self.kb();
        let ds = self.dataset(dataset);
        for dir in [
            &kb.root,
            &kb.transe_dir,
            &ds.root,
            &ds.grounded_dir,
            &ds.paths_dir,
            &ds.graph_dir,
            &ds.triples_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| LayoutError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(data_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            data_dir: data_dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn directories_are_namespaced_by_kb_and_settings() {
        let layout = DataLayout::new(&config(Path::new("/data")));
        let ds = layout.dataset("csqa");
        assert_eq!(ds.root, PathBuf::from("/data/csqa_conceptnet"));
        assert_eq!(
            ds.pruned_paths("dev"),
            PathBuf::from("/data/csqa_conceptnet/paths_2_5_100/dev.paths.pruned.jsonl")
        );
        assert_eq!(
            ds.triples("train"),
            PathBuf::from("/data/csqa_conceptnet/triples_2_5_100/train.triples.bin")
        );

        let kb = layout.kb();
        assert_eq!(kb.vocab, PathBuf::from("/data/conceptnet/concept.txt"));
        assert_eq!(
            kb.graph(GraphVariant::Pruned),
            PathBuf::from("/data/conceptnet/conceptnet.en.pruned.graph")
        );
        assert_eq!(
            kb.entity_embeddings(),
            PathBuf::from("/data/transe/glove.transe.conceptnet.sgd.ent.npy")
        );
    }

    #[test]
    fn other_settings_use_other_directories() {
        let mut cfg = config(Path::new("/data"));
        cfg.kb = "swow".into();
        cfg.max_num_paths = 10;
        let ds = DataLayout::new(&cfg).dataset("obqa");
        assert_eq!(ds.graph_dir, PathBuf::from("/data/obqa_swow/graph_2_5_10"));
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(&config(dir.path()));
        layout.ensure_dirs("csqa").unwrap();
        layout.ensure_dirs("csqa").unwrap();
        assert!(layout.dataset("csqa").graph_dir.is_dir());
        assert!(layout.kb().transe_dir.is_dir());
    }
}
