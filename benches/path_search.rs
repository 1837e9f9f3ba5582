//! Benchmarks for bounded path search and schema-graph assembly.

use std::ops::ControlFlow;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};

use kgpath::graph::traverse::{PathBounds, for_each_simple_path};
use kgpath::graph::{GraphVariant, KnowledgeEdge, KnowledgeGraph};
use kgpath::grounded::GroundedExample;
use kgpath::paths::{PathFinder, PathFinderConfig};
use kgpath::subgraph::{SchemaGraphBuilder, SubgraphConfig};
use kgpath::vocab::{ConceptId, RelationId, RelationVocab};

/// Random sparse graph with `n` concepts and roughly `degree` out-edges each.
fn random_graph(n: u32, degree: u32) -> KnowledgeGraph {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let relations = RelationVocab::conceptnet();
    let rel_count = relations.len() as u16;
    let edges: Vec<KnowledgeEdge> = (0..n)
        .flat_map(|h| (0..degree).map(move |_| h))
        .map(|h| {
            KnowledgeEdge::new(
                ConceptId(h),
                RelationId(rng.gen_range(0..rel_count)),
                ConceptId(rng.gen_range(0..n)),
            )
        })
        .filter(|e| e.head != e.tail)
        .collect();
    KnowledgeGraph::from_edges(n as usize, relations, GraphVariant::Unpruned, edges)
        .expect("valid synthetic graph")
}

fn bench_enumerate(c: &mut Criterion) {
    let kg = random_graph(2_000, 8);
    c.bench_function("enumerate_len4_2k", |bench| {
        bench.iter(|| {
            black_box(for_each_simple_path(
                &kg,
                ConceptId(0),
                ConceptId(1),
                PathBounds::new(1, 4),
                |_| ControlFlow::Continue(()),
            ))
        })
    });
}

fn bench_find(c: &mut Criterion) {
    let kg = random_graph(2_000, 8);
    let finder = PathFinder::new(
        &kg,
        PathFinderConfig {
            max_len: 4,
            ..Default::default()
        },
    );
    let example = GroundedExample::new(
        (0..5).map(ConceptId).collect(),
        (100..103).map(ConceptId).collect(),
    );
    c.bench_function("find_paths_5x3_2k", |bench| {
        bench.iter(|| black_box(finder.find(&example)))
    });
}

fn bench_two_hop(c: &mut Criterion) {
    let kg = random_graph(2_000, 8);
    let builder = SchemaGraphBuilder::new(&kg, SubgraphConfig::default());
    let example = GroundedExample::new(
        (0..5).map(ConceptId).collect(),
        (100..103).map(ConceptId).collect(),
    );
    c.bench_function("two_hop_graph_5x3_2k", |bench| {
        bench.iter(|| black_box(builder.build_two_hop(&example)))
    });
}

criterion_group!(benches, bench_enumerate, bench_find, bench_two_hop);
criterion_main!(benches);
