// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # kgpath
//!
//! Path finding and schema-graph construction over ConceptNet for commonsense
//! question answering.
//!
//! ## Architecture
//!
//! - **Vocabularies** (`vocab`): dense concept and relation IDs
//! - **Knowledge graph** (`graph`): read-only petgraph multigraph, binary store,
//!   bounded traversal, ConceptNet ingestion
//! - **Paths** (`paths`): bounded simple-path search, TransE scoring, pruning
//! - **Schema graphs** (`subgraph`): per-example node sets and normalized
//!   sparse adjacency; triples (`triples`) are derived from them
//! - **Pipeline** (`pipeline`): worker pool, atomic stage outputs, resumable driver
//!
//! ## Library usage
//!
//! ```no_run
//! use kgpath::graph::store::KnowledgeStore;
//! use kgpath::grounded::GroundedExample;
//! use kgpath::paths::{PathFinderConfig, find_paths};
//! use std::path::Path;
//!
//! let store = KnowledgeStore::load(
//!     Path::new("data/conceptnet/conceptnet.en.pruned.graph"),
//!     Path::new("data/conceptnet/concept.txt"),
//! )
//! .unwrap();
//! let dog = store.vocab.lookup("dog").unwrap();
//! let pet = store.vocab.lookup("pet").unwrap();
//! let example = GroundedExample::new(vec![dog], vec![pet]);
//! let paths = find_paths(&example, &store.graph, PathFinderConfig::default());
//! println!("{} paths", paths.path_count());
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod grounded;
pub mod layout;
pub mod paths;
pub mod pipeline;
pub mod subgraph;
pub mod triples;
pub mod vocab;
