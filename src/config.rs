//! Pipeline configuration, persisted as TOML.
//!
//! Every field has a serde default, so an empty file (or no file) gives the
//! standard settings. Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::conceptnet::GraphBuildOptions;
use crate::paths::{PathFinderConfig, ScoreAggregation};
use crate::subgraph::{Normalization, SubgraphConfig};

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Paths scoring below this are pruned.
    #[serde(default = "default_path_prune_threshold")]
    pub path_prune_threshold: f32,
    /// Node cap of a schema graph.
    #[serde(default = "default_max_node_num")]
    pub max_node_num: usize,
    /// Shortest path searched, in edges.
    #[serde(default = "default_min_path_length")]
    pub min_path_length: usize,
    /// Longest path searched, in edges.
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
    /// Paths kept per question/answer pair.
    #[serde(default = "default_max_num_paths")]
    pub max_num_paths: usize,
    /// Worker threads.
    #[serde(default = "default_nprocs")]
    pub nprocs: usize,
    /// Sampling seed.
    #[serde(default)]
    pub seed: u64,
    /// Knowledge base name; namespaces the output directories.
    #[serde(default = "default_kb")]
    pub kb: String,
    /// Pruned graph only: assertions below this confidence are dropped.
    #[serde(default = "default_min_edge_weight")]
    pub min_edge_weight: f32,
    #[serde(default)]
    pub score_aggregation: ScoreAggregation,
    #[serde(default)]
    pub normalization: Normalization,
    /// Longest relational path extracted from a schema graph.
    #[serde(default = "default_relational_path_max_hops")]
    pub relational_path_max_hops: usize,
    /// Root of all pipeline artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Dataset processed by `run`.
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Splits processed by `run`, in order.
    #[serde(default = "default_splits")]
    pub splits: Vec<String>,
}

fn default_path_prune_threshold() -> f32 {
    0.12
}
fn default_max_node_num() -> usize {
    200
}
fn default_min_path_length() -> usize {
    2
}
fn default_max_path_length() -> usize {
    5
}
fn default_max_num_paths() -> usize {
    100
}
fn default_nprocs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}
fn default_kb() -> String {
    "conceptnet".into()
}
fn default_min_edge_weight() -> f32 {
    0.5
}
fn default_relational_path_max_hops() -> usize {
    2
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_dataset() -> String {
    "csqa".into()
}
fn default_splits() -> Vec<String> {
    vec!["train".into(), "dev".into(), "test".into()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            path_prune_threshold: default_path_prune_threshold(),
            max_node_num: default_max_node_num(),
            min_path_length: default_min_path_length(),
            max_path_length: default_max_path_length(),
            max_num_paths: default_max_num_paths(),
            nprocs: default_nprocs(),
            seed: 0,
            kb: default_kb(),
            min_edge_weight: default_min_edge_weight(),
            score_aggregation: ScoreAggregation::default(),
            normalization: Normalization::default(),
            relational_path_max_hops: default_relational_path_max_hops(),
            data_dir: default_data_dir(),
            dataset: default_dataset(),
            splits: default_splits(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject settings no stage can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });
        if self.min_path_length == 0 {
            return invalid("min_path_length must be at least 1".into());
        }
        if self.min_path_length > self.max_path_length {
            return invalid(format!(
                "min_path_length ({}) exceeds max_path_length ({})",
                self.min_path_length, self.max_path_length
            ));
        }
        if self.max_num_paths == 0 {
            return invalid("max_num_paths must be at least 1".into());
        }
        if self.max_node_num == 0 {
            return invalid("max_node_num must be at least 1".into());
        }
        if self.nprocs == 0 {
            return invalid("nprocs must be at least 1".into());
        }
        if !self.path_prune_threshold.is_finite() {
            return invalid("path_prune_threshold must be a finite number".into());
        }
        if !self.min_edge_weight.is_finite() {
            return invalid("min_edge_weight must be a finite number".into());
        }
        if self.relational_path_max_hops == 0 {
            return invalid("relational_path_max_hops must be at least 1".into());
        }
        if self.kb.is_empty() || self.kb.contains(['/', '\\']) {
            return invalid(format!("kb must be a plain directory name, got {:?}", self.kb));
        }
        Ok(())
    }

    pub fn path_finder(&self) -> PathFinderConfig {
        PathFinderConfig {
            min_len: self.min_path_length,
            max_len: self.max_path_length,
            max_num_paths: self.max_num_paths,
            seed: self.seed,
        }
    }

    pub fn subgraph(&self) -> SubgraphConfig {
        SubgraphConfig {
            max_node_num: self.max_node_num,
            normalization: self.normalization,
        }
    }

    pub fn graph_build(&self, prune: bool) -> GraphBuildOptions {
        GraphBuildOptions {
            prune,
            min_edge_weight: self.min_edge_weight,
        }
    }
}
