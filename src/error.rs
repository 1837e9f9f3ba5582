//! Rich diagnostic error types for the kgpath pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::layout::LayoutError;

/// Top-level error type for the kgpath pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Layout(#[from] LayoutError),
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

/// Failures while loading vocabularies, graphs, embeddings or ConceptNet sources.
///
/// All of these are fatal: they abort the run before any worker starts.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(kgpath::load::io),
        help("Check that the file exists and is readable. Earlier pipeline stages may not have run yet.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("concept vocabulary is empty: {path}")]
    #[diagnostic(
        code(kgpath::load::empty_vocab),
        help("The vocabulary must list one concept per line. Re-run `kgpath conceptnet extract`.")
    )]
    EmptyVocab { path: String },

    #[error("duplicate concept \"{concept}\" on line {line}")]
    #[diagnostic(
        code(kgpath::load::duplicate_concept),
        help("Concept IDs are line numbers, so every concept must appear exactly once.")
    )]
    DuplicateConcept { concept: String, line: usize },

    #[error("not a kgpath graph file: {path}")]
    #[diagnostic(
        code(kgpath::load::bad_magic),
        help("The file does not start with the graph header. Rebuild it with `kgpath conceptnet build`.")
    )]
    BadMagic { path: String },

    #[error("unsupported graph format version {version} in {path}")]
    #[diagnostic(
        code(kgpath::load::version),
        help("The graph was written by an incompatible release. Rebuild it with this version.")
    )]
    UnsupportedVersion { path: String, version: u32 },

    #[error("corrupt graph file {path}: {message}")]
    #[diagnostic(
        code(kgpath::load::corrupt_graph),
        help("The graph body could not be decoded. Rebuild it from the ConceptNet CSV.")
    )]
    CorruptGraph { path: String, message: String },

    #[error("graph {path} references {graph_concepts} concepts but the vocabulary has {vocab_concepts}")]
    #[diagnostic(
        code(kgpath::load::vocab_mismatch),
        help("The graph and vocabulary were built from different ConceptNet extracts. Rebuild both together.")
    )]
    VocabMismatch {
        path: String,
        graph_concepts: usize,
        vocab_concepts: usize,
    },

    #[error("concept {concept} is outside the vocabulary of {vocab_size} concepts")]
    #[diagnostic(
        code(kgpath::load::concept_out_of_range),
        help("An edge references a concept ID that has no vocabulary entry.")
    )]
    ConceptOutOfRange { concept: u32, vocab_size: usize },

    #[error("relation {relation} is outside the vocabulary of {relation_count} relations")]
    #[diagnostic(
        code(kgpath::load::relation_out_of_range),
        help("An edge references a relation ID that the relation vocabulary does not define.")
    )]
    RelationOutOfRange { relation: u16, relation_count: usize },

    #[error("unknown relation \"{name}\"")]
    #[diagnostic(
        code(kgpath::load::unknown_relation),
        help("Relations in the English CSV must be one of the merged ConceptNet relations.")
    )]
    UnknownRelation { name: String },

    #[error("unknown concept \"{concept}\"")]
    #[diagnostic(
        code(kgpath::load::unknown_concept),
        help("The English CSV mentions a concept missing from the vocabulary. Regenerate both with `kgpath conceptnet extract`.")
    )]
    UnknownConcept { concept: String },

    #[error("malformed assertion at {path}:{line}: {message}")]
    #[diagnostic(
        code(kgpath::load::malformed_assertion),
        help("Each line must be tab-separated: relation, head, tail, weight.")
    )]
    MalformedAssertion {
        path: String,
        line: usize,
        message: String,
    },

    #[error("invalid embedding file {path}: {message}")]
    #[diagnostic(
        code(kgpath::load::embedding),
        help("Embeddings must be 2-D little-endian float32 or float64 .npy arrays in C order.")
    )]
    Embedding { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Scoring errors
// ---------------------------------------------------------------------------

/// A path could not be scored. Absorbed per path: the path gets the worst score.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ScoreError {
    #[error("no embedding for concept {concept}")]
    #[diagnostic(
        code(kgpath::score::missing_concept),
        help("The entity embedding matrix has fewer rows than the concept vocabulary.")
    )]
    MissingConceptEmbedding { concept: u32 },

    #[error("no embedding for relation {relation}")]
    #[diagnostic(
        code(kgpath::score::missing_relation),
        help("The relation embedding matrix has fewer rows than there are canonical relations.")
    )]
    MissingRelationEmbedding { relation: u16 },

    #[error("path hop {hop} carries no relation")]
    #[diagnostic(
        code(kgpath::score::empty_hop),
        help("Every hop of a path record must list at least one relation.")
    )]
    EmptyHop { hop: usize },
}

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Failures of a pipeline stage. Fatal to the stage; no output is committed.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("I/O error on {path}")]
    #[diagnostic(
        code(kgpath::stage::io),
        help("Check that the directory exists, has correct permissions, and that the disk is not full.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse record at {path}:{line}: {message}")]
    #[diagnostic(
        code(kgpath::stage::parse),
        help("The input is not the output of the previous stage. Delete it and re-run that stage.")
    )]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("serialization error on {path}: {message}")]
    #[diagnostic(
        code(kgpath::stage::serde),
        help("The binary artifact could not be encoded or decoded. Re-run the stage that produced it.")
    )]
    Serialization { path: String, message: String },

    #[error("stage {stage} failed on example {index}: {message}")]
    #[diagnostic(
        code(kgpath::stage::example),
        help("Fix the input for this example and re-run the stage; earlier stages keep their output.")
    )]
    Example {
        stage: String,
        index: usize,
        message: String,
    },

    #[error("stage {stage} expected {expected} records but found {actual}")]
    #[diagnostic(
        code(kgpath::stage::length_mismatch),
        help("Stage inputs must be line-aligned. One of them is stale; delete it and re-run its stage.")
    )]
    LengthMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },

    #[error("worker pool error: {message}")]
    #[diagnostic(
        code(kgpath::stage::pool),
        help("The worker pool could not be started. Lower `nprocs`.")
    )]
    Pool { message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(kgpath::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(kgpath::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(kgpath::config::parse),
        help("Check the TOML syntax and the field names of the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(kgpath::config::invalid), help("Check the pipeline settings. {message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning kgpath results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
