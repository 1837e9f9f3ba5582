//! End-to-end tests of the preprocessing stages.
//!
//! These tests chain the stages the way a pipeline run does, from a raw
//! ConceptNet dump through path finding, scoring, pruning, schema graphs,
//! triples and relational paths, and check the artifacts between them.

mod common;

use std::path::PathBuf;

use kgpath::graph::conceptnet::GraphBuildOptions;
use kgpath::graph::store::KnowledgeStore;
use kgpath::graph::{GraphVariant, KnowledgeEdge, KnowledgeGraph};
use kgpath::grounded::GroundedExample;
use kgpath::paths::relational::RelationalPaths;
use kgpath::paths::{
    ExamplePaths, PairPaths, PathFinderConfig, PathRecord, ScoreAggregation, find_paths,
    prune_example,
};
use kgpath::pipeline::io::{read_bincode, read_ndjson};
use kgpath::pipeline::{Embeddings, WorkerPool, stages};
use kgpath::subgraph::{NodeType, SchemaGraphBuilder, SubgraphConfig};
use kgpath::triples::{self, TripleRecord};
use kgpath::vocab::{ConceptId, ConceptVocab, RelationId, RelationVocab};

use common::*;

fn c(id: u32) -> ConceptId {
    ConceptId(id)
}

fn r(id: u16) -> RelationId {
    RelationId(id)
}

/// A=0, B=1, C=2, D=3, E=4 with A -isa-> B -isa-> C and A -isa-> D.
fn toy_graph() -> KnowledgeGraph {
    KnowledgeGraph::from_edges(
        5,
        RelationVocab::conceptnet(),
        GraphVariant::Pruned,
        [(0, 1), (1, 2), (0, 3)]
            .into_iter()
            .map(|(h, t)| KnowledgeEdge::new(c(h), r(ISA), c(t))),
    )
    .unwrap()
}

#[test]
fn toy_graph_end_to_end() {
    let kg = toy_graph();
    let example = GroundedExample::new(vec![c(0)], vec![c(2)]);
    let config = PathFinderConfig {
        min_len: 1,
        max_len: 3,
        ..Default::default()
    };

    let paths = find_paths(&example, &kg, config);
    assert_eq!(paths.path_count(), 1);
    assert_eq!(paths.pairs[0].paths[0].path, vec![c(0), c(1), c(2)]);

    let subgraph = SchemaGraphBuilder::new(&kg, SubgraphConfig::default()).build_from_paths(&example, &paths);
    assert_eq!(subgraph.nodes, vec![c(0), c(2), c(1)]);
    assert_eq!(
        subgraph.node_types,
        vec![NodeType::Question, NodeType::Answer, NodeType::Other]
    );
    // D is only reachable from A, never on a path, so it stays out.
    assert!(!subgraph.nodes.contains(&c(3)));

    let triples = triples::extract(&subgraph.adjacency, &subgraph.nodes);
    let expected: Vec<_> = vec![(0, r(ISA), 2), (2, r(ISA), 1)];
    assert_eq!(triples.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn empty_grounding_gives_empty_outputs() {
    let kg = toy_graph();
    let example = GroundedExample::default();
    let paths = find_paths(&example, &kg, PathFinderConfig::default());
    assert!(paths.pairs.is_empty());

    let builder = SchemaGraphBuilder::new(&kg, SubgraphConfig::default());
    for subgraph in [builder.build_from_paths(&example, &paths), builder.build_two_hop(&example)] {
        assert!(subgraph.nodes.is_empty());
        assert!(subgraph.node_types.is_empty());
        assert!(subgraph.adjacency.is_empty());
        assert!(triples::extract(&subgraph.adjacency, &subgraph.nodes).is_empty());
    }
}

#[test]
fn pruning_keeps_scores_at_the_threshold() {
    let path = |score: f32| PathRecord {
        path: vec![c(0), c(1), c(2)],
        rel: vec![vec![r(ISA)], vec![r(ISA)]],
        score: Some(score),
    };
    let example = ExamplePaths {
        pairs: vec![PairPaths {
            qc: c(0),
            ac: c(2),
            paths: vec![path(0.12), path(0.119), path(0.5)],
        }],
    };
    let pruned = prune_example(&example, 0.12);
    let kept: Vec<f32> = pruned.paths().filter_map(|p| p.score).collect();
    assert_eq!(kept, vec![0.12, 0.5]);
    // The pair stays even when all of its paths go.
    assert_eq!(prune_example(&example, 0.9).pairs.len(), 1);
}

#[test]
fn node_cap_keeps_grounded_concepts_first() {
    let kg = toy_graph();
    let example = GroundedExample::new(vec![c(0), c(4)], vec![c(2)]);
    let paths = find_paths(
        &example,
        &kg,
        PathFinderConfig {
            min_len: 1,
            max_len: 3,
            ..Default::default()
        },
    );
    let config = SubgraphConfig {
        max_node_num: 3,
        ..Default::default()
    };
    let subgraph = SchemaGraphBuilder::new(&kg, config).build_from_paths(&example, &paths);
    assert_eq!(subgraph.nodes, vec![c(0), c(4), c(2)]);
    assert_eq!(subgraph.truncated, 1);
}

/// Every artifact path of one tempdir run.
struct Run {
    dir: tempfile::TempDir,
}

impl Run {
    fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("assertions.csv"), DUMP).unwrap();
        std::fs::write(dir.path().join("dev.grounded.jsonl"), GROUNDED).unwrap();
        write_npy(&dir.path().join("ent.npy"), &entity_rows());
        write_npy(&dir.path().join("rel.npy"), &relation_rows());
        Self { dir }
    }

    fn p(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[test]
fn conceptnet_dump_to_relational_paths() {
    let run = Run::new();
    let pool = WorkerPool::new(2).unwrap();

    stages::extract_conceptnet(&run.p("assertions.csv"), &run.p("en.csv"), &run.p("concept.txt"))
        .unwrap();
    let vocab = ConceptVocab::load(&run.p("concept.txt")).unwrap();
    assert_eq!(vocab.len(), 4);
    assert_eq!(vocab.lookup("kennel"), Some(c(KENNEL)));

    stages::build_knowledge_graph(
        &run.p("en.csv"),
        &run.p("concept.txt"),
        &run.p("en.pruned.graph"),
        GraphBuildOptions::default(),
    )
    .unwrap();
    let store = KnowledgeStore::load(&run.p("en.pruned.graph"), &run.p("concept.txt")).unwrap();
    assert_eq!(store.graph.edge_count(), 8);

    let config = PathFinderConfig::default();
    let report = stages::find_paths(
        &pool,
        &store,
        &run.p("dev.grounded.jsonl"),
        &run.p("raw.jsonl"),
        config,
    )
    .unwrap();
    assert_eq!((report.examples, report.items), (2, 3));

    let raw: Vec<ExamplePaths> = read_ndjson(&run.p("raw.jsonl")).unwrap();
    let to_organism = &raw[0].pairs[0];
    assert_eq!((to_organism.qc, to_organism.ac), (c(DOG), c(ORGANISM)));
    assert_eq!(
        to_organism.paths[0].path,
        vec![c(DOG), c(ANIMAL), c(ORGANISM)]
    );
    assert_eq!(to_organism.paths[0].rel, vec![vec![r(ISA)], vec![r(ISA)]]);
    assert_eq!(to_organism.paths[1].path.len(), 4);
    assert!(raw[1].pairs.is_empty());

    let embeddings = Embeddings::load(&run.p("ent.npy"), &run.p("rel.npy")).unwrap();
    stages::score_paths(
        &pool,
        store.graph.relations(),
        &embeddings,
        &run.p("raw.jsonl"),
        &run.p("scored.jsonl"),
        ScoreAggregation::Product,
    )
    .unwrap();
    let scored: Vec<ExamplePaths> = read_ndjson(&run.p("scored.jsonl")).unwrap();
    let scores: Vec<f32> = scored[0].paths().map(|p| p.score.unwrap()).collect();
    assert_eq!(scores.len(), 3);
    assert!((scores[0] - 1.0).abs() < 1e-5);
    assert!(scores[1] < 0.12 && scores[2] < 0.12);

    let report = stages::prune_paths(&run.p("scored.jsonl"), &run.p("pruned.jsonl"), 0.12).unwrap();
    assert_eq!(report.items, 1);

    let report = stages::build_graph(
        &pool,
        &store,
        &run.p("dev.grounded.jsonl"),
        &run.p("pruned.jsonl"),
        &run.p("graph.jsonl"),
        &run.p("graph.adj.bin"),
        SubgraphConfig::default(),
    )
    .unwrap();
    assert_eq!(report.examples, 2);
    let subgraphs = stages::load_subgraphs(&run.p("graph.jsonl"), &run.p("graph.adj.bin")).unwrap();
    let first = &subgraphs[0];
    assert_eq!(first.nodes, vec![c(DOG), c(ORGANISM), c(KENNEL), c(ANIMAL)]);
    assert_eq!(
        first.node_types,
        vec![NodeType::Question, NodeType::Answer, NodeType::Answer, NodeType::Other]
    );
    assert_eq!(first.adjacency.nnz(), 8);
    assert!(subgraphs[1].nodes.is_empty());

    stages::build_two_hop(
        &pool,
        &store,
        &run.p("dev.grounded.jsonl"),
        &run.p("2hop.jsonl"),
        &run.p("2hop.adj.bin"),
        SubgraphConfig::default(),
    )
    .unwrap();
    let two_hop = stages::load_subgraphs(&run.p("2hop.jsonl"), &run.p("2hop.adj.bin")).unwrap();
    assert_eq!(two_hop[0].nodes, first.nodes);

    stages::extract_triples(&pool, &run.p("graph.jsonl"), &run.p("graph.adj.bin"), &run.p("triples.bin"))
        .unwrap();
    let triples: Vec<TripleRecord> = read_bincode(&run.p("triples.bin")).unwrap();
    assert_eq!(triples[0].triples.len(), 8);
    assert!(
        triples[0]
            .concept_triples()
            .any(|t| t == (c(DOG), r(ISA), c(ANIMAL)))
    );
    assert!(triples[1].triples.is_empty());

    stages::extract_relational_paths(
        &pool,
        &run.p("graph.jsonl"),
        &run.p("graph.adj.bin"),
        &run.p("relpaths.jsonl"),
        2,
    )
    .unwrap();
    let relational: Vec<RelationalPaths> = read_ndjson(&run.p("relpaths.jsonl")).unwrap();
    let pairs = &relational[0].pairs;
    assert_eq!(pairs.len(), 2);
    assert_eq!((pairs[0].qc, pairs[0].ac), (0, 1));
    assert_eq!(pairs[0].rel_paths, vec![vec![r(ISA), r(ISA)]]);
    assert_eq!(
        pairs[1].rel_paths,
        vec![vec![r(ATLOCATION)], vec![r(ISA), r(ATLOCATION)]]
    );
    assert!(relational[1].pairs.is_empty());
}

#[test]
fn triples_are_stable_across_reloads() {
    let run = Run::new();
    let pool = WorkerPool::new(1).unwrap();
    stages::extract_conceptnet(&run.p("assertions.csv"), &run.p("en.csv"), &run.p("concept.txt"))
        .unwrap();
    stages::build_knowledge_graph(
        &run.p("en.csv"),
        &run.p("concept.txt"),
        &run.p("kg.graph"),
        GraphBuildOptions::default(),
    )
    .unwrap();
    let store = KnowledgeStore::load(&run.p("kg.graph"), &run.p("concept.txt")).unwrap();
    stages::build_two_hop(
        &pool,
        &store,
        &run.p("dev.grounded.jsonl"),
        &run.p("g.jsonl"),
        &run.p("g.adj.bin"),
        SubgraphConfig::default(),
    )
    .unwrap();

    let once = stages::load_subgraphs(&run.p("g.jsonl"), &run.p("g.adj.bin")).unwrap();
    let twice = stages::load_subgraphs(&run.p("g.jsonl"), &run.p("g.adj.bin")).unwrap();
    for (a, b) in once.iter().zip(&twice) {
        assert_eq!(
            triples::extract(&a.adjacency, &a.nodes),
            triples::extract(&b.adjacency, &b.nodes)
        );
    }
}

#[test]
fn path_sampling_does_not_depend_on_thread_count() {
    // Layered graph 0 -> {1..=6} -> {7..=12} -> 13 with 36 paths of length 3.
    let mut edges = Vec::new();
    for i in 1..=6u32 {
        edges.push((0, i));
        for j in 7..=12u32 {
            edges.push((i, j));
        }
    }
    for j in 7..=12u32 {
        edges.push((j, 13));
    }
    let graph = KnowledgeGraph::from_edges(
        14,
        RelationVocab::conceptnet(),
        GraphVariant::Pruned,
        edges.into_iter().map(|(h, t)| KnowledgeEdge::new(c(h), r(ISA), c(t))),
    )
    .unwrap();
    let vocab = ConceptVocab::from_concepts((0..14).map(|i| format!("c{i}"))).unwrap();
    let store = KnowledgeStore::new(vocab, graph).unwrap();

    let run = Run::new();
    let grounded: String = (0..8)
        .map(|_| "{\"qc\": [\"c0\"], \"ac\": [\"c13\"]}\n")
        .collect();
    std::fs::write(run.p("layered.jsonl"), grounded).unwrap();
    let config = PathFinderConfig {
        min_len: 2,
        max_len: 3,
        max_num_paths: 5,
        seed: 42,
    };

    for (threads, output) in [(1, "one.jsonl"), (4, "four.jsonl")] {
        stages::find_paths(
            &WorkerPool::new(threads).unwrap(),
            &store,
            &run.p("layered.jsonl"),
            &run.p(output),
            config,
        )
        .unwrap();
    }
    let one = std::fs::read_to_string(run.p("one.jsonl")).unwrap();
    let four = std::fs::read_to_string(run.p("four.jsonl")).unwrap();
    assert_eq!(one, four);

    let examples: Vec<ExamplePaths> = read_ndjson(&run.p("one.jsonl")).unwrap();
    assert!(examples.iter().all(|e| e.path_count() == 5));
}
