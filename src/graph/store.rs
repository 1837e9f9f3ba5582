//! Binary graph files and the knowledge store.
//!
//! A graph file is an 8-byte magic, a little-endian `u32` format version, and a
//! bincode body. Files are memory-mapped for decoding so that multi-gigabyte
//! graphs are not copied through an intermediate buffer.

use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::vocab::{ConceptId, ConceptVocab, RelationId, RelationVocab};

use super::{GraphVariant, KnowledgeEdge, KnowledgeGraph, KnowledgeGraphBuilder};

const GRAPH_MAGIC: &[u8; 8] = b"KGPATH\0G";
const GRAPH_VERSION: u32 = 1;
const HEADER_SIZE: usize = 12;

/// On-disk edge layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredEdge {
    head: u32,
    tail: u32,
    relation: u16,
    weight: f32,
    merged: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    variant: GraphVariant,
    num_concepts: u64,
    relations: RelationVocab,
    edges: Vec<StoredEdge>,
}

/// Encode a graph into the on-disk format.
pub fn encode_graph(graph: &KnowledgeGraph) -> Result<Vec<u8>, LoadError> {
    let body = GraphFile {
        variant: graph.variant(),
        num_concepts: graph.num_concepts() as u64,
        relations: graph.relations().clone(),
        edges: graph
            .edges()
            .map(|e| StoredEdge {
                head: e.head.0,
                tail: e.tail.0,
                relation: e.relation.0,
                weight: e.weight,
                merged: e.merged,
            })
            .collect(),
    };
    let encoded = bincode::serialize(&body).map_err(|e| LoadError::CorruptGraph {
        path: "<memory>".into(),
        message: format!("failed to encode graph: {e}"),
    })?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + encoded.len());
    bytes.extend_from_slice(GRAPH_MAGIC);
    bytes.extend_from_slice(&GRAPH_VERSION.to_le_bytes());
    bytes.extend_from_slice(&encoded);
    Ok(bytes)
}

/// Write a graph to `path`.
pub fn save_graph(graph: &KnowledgeGraph, path: &Path) -> Result<(), LoadError> {
    let bytes = encode_graph(graph)?;
    std::fs::write(path, bytes).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Read a graph from `path`, checking that it fits a vocabulary of `vocab_size`
/// concepts.
pub fn load_graph(path: &Path, vocab_size: usize) -> Result<KnowledgeGraph, LoadError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    // Safety: the file is opened read-only and the map is dropped before return.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;

    if mmap.len() < HEADER_SIZE || &mmap[..8] != GRAPH_MAGIC {
        return Err(LoadError::BadMagic { path: display });
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&mmap[8..HEADER_SIZE]);
    let version = u32::from_le_bytes(version);
    if version != GRAPH_VERSION {
        return Err(LoadError::UnsupportedVersion {
            path: display,
            version,
        });
    }

    let body: GraphFile =
        bincode::deserialize(&mmap[HEADER_SIZE..]).map_err(|e| LoadError::CorruptGraph {
            path: display.clone(),
            message: e.to_string(),
        })?;

    if body.num_concepts as usize != vocab_size {
        return Err(LoadError::VocabMismatch {
            path: display,
            graph_concepts: body.num_concepts as usize,
            vocab_concepts: vocab_size,
        });
    }

    let mut builder =
        KnowledgeGraphBuilder::new(vocab_size, body.relations, body.variant);
    for e in body.edges {
        builder.add_edge(KnowledgeEdge {
            head: ConceptId(e.head),
            relation: RelationId(e.relation),
            tail: ConceptId(e.tail),
            weight: e.weight,
            merged: e.merged,
        })?;
    }
    Ok(builder.build())
}

/// The concept vocabulary and the knowledge graph built over it.
///
/// Loaded once by the coordinating thread and borrowed immutably by every worker.
#[derive(Debug)]
pub struct KnowledgeStore {
    pub vocab: ConceptVocab,
    pub graph: KnowledgeGraph,
}

impl KnowledgeStore {
    /// Load the vocabulary, then the graph that references it.
    pub fn load(graph_path: &Path, vocab_path: &Path) -> Result<Self, LoadError> {
        let vocab = ConceptVocab::load(vocab_path)?;
        let graph = load_graph(graph_path, vocab.len())?;
        tracing::info!(
            concepts = vocab.len(),
            edges = graph.edge_count(),
            variant = %graph.variant(),
            "loaded knowledge graph"
        );
        Ok(Self { vocab, graph })
    }

    pub fn new(vocab: ConceptVocab, graph: KnowledgeGraph) -> Result<Self, LoadError> {
        if vocab.len() != graph.num_concepts() {
            return Err(LoadError::VocabMismatch {
                path: "<memory>".into(),
                graph_concepts: graph.num_concepts(),
                vocab_concepts: vocab.len(),
            });
        }
        Ok(Self { vocab, graph })
    }
}

/// Summary statistics of a stored graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub variant: GraphVariant,
    pub concepts: usize,
    pub connected_concepts: usize,
    pub edges: usize,
    pub relations: usize,
    pub max_out_degree: usize,
    pub mean_out_degree: f64,
}

impl GraphStats {
    pub fn of(graph: &KnowledgeGraph) -> Self {
        let mut connected = 0;
        let mut max_out = 0;
        let mut total_out = 0;
        for id in 0..graph.num_concepts() {
            let concept = ConceptId(id as u32);
            let out = graph.successors(concept).len();
            if out > 0 || !graph.predecessors(concept).is_empty() {
                connected += 1;
            }
            max_out = max_out.max(out);
            total_out += out;
        }
        Self {
            variant: graph.variant(),
            concepts: graph.num_concepts(),
            connected_concepts: connected,
            edges: graph.edge_count(),
            relations: graph.relations().len(),
            max_out_degree: max_out,
            mean_out_degree: if connected == 0 {
                0.0
            } else {
                total_out as f64 / connected as f64
            },
        }
    }
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "variant:            {}", self.variant)?;
        writeln!(f, "concepts:           {}", self.concepts)?;
        writeln!(f, "connected concepts: {}", self.connected_concepts)?;
        writeln!(f, "edges:              {}", self.edges)?;
        writeln!(f, "relations:          {}", self.relations)?;
        writeln!(f, "max out-degree:     {}", self.max_out_degree)?;
        write!(f, "mean out-degree:    {:.2}", self.mean_out_degree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_graph() -> KnowledgeGraph {
        KnowledgeGraph::from_edges(
            3,
            RelationVocab::conceptnet(),
            GraphVariant::Pruned,
            [
                KnowledgeEdge::new(ConceptId(0), RelationId(5), ConceptId(1)).with_weight(2.0),
                KnowledgeEdge::new(ConceptId(1), RelationId(22), ConceptId(0)).with_weight(2.0),
                KnowledgeEdge::new(ConceptId(1), RelationId(15), ConceptId(2)),
                KnowledgeEdge::new(ConceptId(2), RelationId(15), ConceptId(1)).merged(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cpnet.graph");
        let graph = sample_graph();
        save_graph(&graph, &path).unwrap();

        let loaded = load_graph(&path, 3).unwrap();
        assert_eq!(loaded.variant(), GraphVariant::Pruned);
        assert_eq!(loaded.edge_count(), 4);
        assert_eq!(loaded.edges().collect::<Vec<_>>(), graph.edges().collect::<Vec<_>>());
    }

    #[test]
    fn vocab_size_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cpnet.graph");
        save_graph(&sample_graph(), &path).unwrap();

        let err = load_graph(&path, 5).unwrap_err();
        assert!(matches!(
            err,
            LoadError::VocabMismatch {
                graph_concepts: 3,
                vocab_concepts: 5,
                ..
            }
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.graph");
        std::fs::write(&path, b"definitely not a graph").unwrap();
        assert!(matches!(load_graph(&path, 3), Err(LoadError::BadMagic { .. })));

        let mut truncated = GRAPH_MAGIC.to_vec();
        truncated.extend_from_slice(&GRAPH_VERSION.to_le_bytes());
        truncated.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, truncated).unwrap();
        assert!(matches!(
            load_graph(&path, 3),
            Err(LoadError::CorruptGraph { .. })
        ));
    }

    #[test]
    fn future_versions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.graph");
        let mut bytes = GRAPH_MAGIC.to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            load_graph(&path, 3),
            Err(LoadError::UnsupportedVersion { version: 99, .. })
        ));
    }

    #[test]
    fn store_requires_vocab_and_graph() {
        let dir = TempDir::new().unwrap();
        let graph_path = dir.path().join("cpnet.graph");
        save_graph(&sample_graph(), &graph_path).unwrap();

        let missing = KnowledgeStore::load(&graph_path, &dir.path().join("missing.txt"));
        assert!(matches!(missing, Err(LoadError::Io { .. })));

        let vocab_path = dir.path().join("concept.txt");
        std::fs::write(&vocab_path, "dog\nanimal\npet\n").unwrap();
        let store = KnowledgeStore::load(&graph_path, &vocab_path).unwrap();
        assert_eq!(store.vocab.lookup("pet"), Some(ConceptId(2)));
        assert_eq!(store.graph.successors(ConceptId(0)), &[ConceptId(1)]);
    }

    #[test]
    fn stats_count_degrees() {
        let stats = GraphStats::of(&sample_graph());
        assert_eq!(stats.concepts, 3);
        assert_eq!(stats.connected_concepts, 3);
        assert_eq!(stats.edges, 4);
        assert_eq!(stats.max_out_degree, 2);
    }
}
