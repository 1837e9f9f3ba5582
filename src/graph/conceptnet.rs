//! ConceptNet ingestion.
//!
//! Two steps turn a raw ConceptNet assertions dump into a [`KnowledgeGraph`]:
//!
//! 1. [`extract_english`] keeps English-to-English assertions, normalizes
//!    concept names, merges the ~40 raw relations into 17 canonical ones and
//!    writes a compact tab-separated file plus the concept vocabulary.
//! 2. [`construct_graph`] reads that file and builds the multigraph, adding an
//!    inverse edge for every assertion. The pruned variant also drops
//!    low-confidence and stopword edges and merges symmetric relations.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::LoadError;
use crate::vocab::{ConceptVocab, RelationVocab};

use super::{GraphVariant, KnowledgeEdge, KnowledgeGraph, KnowledgeGraphBuilder};

/// Raw relation groups. The first member names the canonical relation; a `*`
/// prefix marks relations whose head and tail are swapped when merged.
const RELATION_GROUPS: [&str; 17] = [
    "atlocation/locatednear",
    "capableof",
    "causes/causesdesire/*motivatedbygoal",
    "createdby",
    "desires",
    "antonym/distinctfrom",
    "hascontext",
    "hasproperty",
    "hassubevent/hasfirstsubevent/haslastsubevent/hasprerequisite/entails/mannerof",
    "isa/instanceof/definedas",
    "madeof",
    "notcapableof",
    "notdesires",
    "partof/*hasa",
    "relatedto/similarto/synonym",
    "usedfor",
    "receivesaction",
];

/// Concepts never kept in the pruned graph.
const BLACKLIST: [&str; 7] = ["uk", "us", "take", "make", "object", "person", "people"];

/// English stopwords; a concept containing any of them as a `_`-separated token
/// is dropped from the pruned graph.
const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't",
    "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven",
    "haven't", "isn", "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn",
    "needn't", "shan", "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't",
    "won", "won't", "wouldn", "wouldn't", "like", "gone", "going", "would", "could", "get",
    "may", "wanter",
];

/// Map every raw relation name to its canonical name and whether to swap head and tail.
fn relation_merge_table() -> HashMap<&'static str, (&'static str, bool)> {
    let mut table = HashMap::new();
    for group in RELATION_GROUPS {
        let mut members = group.split('/');
        let Some(canonical) = members.next() else {
            continue;
        };
        table.insert(canonical, (canonical, false));
        for member in members {
            match member.strip_prefix('*') {
                Some(reversed) => table.insert(reversed, (canonical, true)),
                None => table.insert(member, (canonical, false)),
            };
        }
    }
    table
}

/// The concept term of an English ConceptNet URI such as `/c/en/ice_cream/n`.
fn english_term(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("/c/en/")?;
    let term = rest.split('/').next()?.to_lowercase();
    let letters: String = term.chars().filter(|c| *c != '_' && *c != '-').collect();
    (!letters.is_empty() && letters.chars().all(char::is_alphabetic)).then_some(term)
}

/// Counts reported by [`extract_english`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub assertions_read: usize,
    pub assertions_kept: usize,
    pub concepts: usize,
}

/// Extract English assertions from a raw ConceptNet dump.
///
/// The dump is tab-separated: assertion URI, relation URI, head URI, tail URI,
/// JSON metadata. Writes `relation\thead\ttail\tweight` lines to `output_csv` and
/// the concept vocabulary, in first-seen order, to `output_vocab`.
pub fn extract_english(
    assertions: &Path,
    output_csv: &Path,
    output_vocab: &Path,
) -> Result<ExtractReport, LoadError> {
    let merge = relation_merge_table();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(assertions)
        .map_err(|e| csv_error(assertions, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(output_csv)
        .map_err(|e| csv_error(output_csv, e))?;

    let mut report = ExtractReport::default();
    let mut concepts: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(assertions, e))?;
        report.assertions_read += 1;
        if record.len() < 5 {
            continue;
        }
        let (Some(mut head), Some(mut tail)) = (english_term(&record[2]), english_term(&record[3]))
        else {
            continue;
        };
        let raw_rel = record[1].rsplit('/').next().unwrap_or_default().to_lowercase();
        let Some(&(rel, reversed)) = merge.get(raw_rel.as_str()) else {
            continue;
        };
        if reversed {
            std::mem::swap(&mut head, &mut tail);
        }
        let meta: serde_json::Value =
            serde_json::from_str(&record[4]).map_err(|e| LoadError::MalformedAssertion {
                path: assertions.display().to_string(),
                line: line + 1,
                message: format!("bad metadata: {e}"),
            })?;
        let weight = meta.get("weight").and_then(|w| w.as_f64()).unwrap_or(1.0);

        writer
            .write_record([rel, head.as_str(), tail.as_str(), &weight.to_string()])
            .map_err(|e| csv_error(output_csv, e))?;
        report.assertions_kept += 1;

        for term in [head, tail] {
            if seen.insert(term.clone()) {
                concepts.push(term);
            }
        }
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: output_csv.display().to_string(),
        source,
    })?;

    report.concepts = concepts.len();
    ConceptVocab::from_concepts(concepts)?.write(output_vocab)?;
    tracing::info!(
        read = report.assertions_read,
        kept = report.assertions_kept,
        concepts = report.concepts,
        "extracted English ConceptNet assertions"
    );
    Ok(report)
}

fn csv_error(path: &Path, e: csv::Error) -> LoadError {
    let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
    match e.into_kind() {
        csv::ErrorKind::Io(source) => LoadError::Io {
            path: path.display().to_string(),
            source,
        },
        other => LoadError::MalformedAssertion {
            path: path.display().to_string(),
            line,
            message: format!("{other:?}"),
        },
    }
}

/// Options for [`construct_graph`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphBuildOptions {
    /// Build the pruned variant.
    pub prune: bool,
    /// Pruned variant only: edges below this weight are dropped.
    pub min_edge_weight: f32,
}

impl Default for GraphBuildOptions {
    fn default() -> Self {
        Self {
            prune: true,
            min_edge_weight: 0.5,
        }
    }
}

fn is_blocked(concept: &str) -> bool {
    BLACKLIST.contains(&concept) || concept.split('_').any(|t| STOPWORDS.contains(&t))
}

/// Build the knowledge graph from an extracted English CSV.
///
/// Every assertion `(h, r, t, w)` becomes `h -r-> t` plus a reverse edge
/// `t -r'-> h`, where `r'` is the inverse of `r`. In the pruned variant symmetric
/// relations keep the canonical ID on the reverse edge and carry the `merged`
/// flag instead. Self-loops are skipped.
pub fn construct_graph(
    english_csv: &Path,
    vocab: &ConceptVocab,
    options: GraphBuildOptions,
) -> Result<KnowledgeGraph, LoadError> {
    let relations = RelationVocab::conceptnet();
    let variant = if options.prune {
        GraphVariant::Pruned
    } else {
        GraphVariant::Unpruned
    };
    let mut builder = KnowledgeGraphBuilder::new(vocab.len(), relations.clone(), variant);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(english_csv)
        .map_err(|e| csv_error(english_csv, e))?;

    let mut skipped = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(english_csv, e))?;
        let malformed = |message: String| LoadError::MalformedAssertion {
            path: english_csv.display().to_string(),
            line: line + 1,
            message,
        };
        if record.len() < 4 {
            return Err(malformed(format!("expected 4 fields, found {}", record.len())));
        }
        let rel = relations
            .lookup(&record[0])
            .ok_or_else(|| LoadError::UnknownRelation {
                name: record[0].to_string(),
            })?;
        let lookup = |name: &str| {
            vocab.lookup(name).ok_or_else(|| LoadError::UnknownConcept {
                concept: name.to_string(),
            })
        };
        let head = lookup(&record[1])?;
        let tail = lookup(&record[2])?;
        let weight: f32 = record[3]
            .parse()
            .map_err(|e| malformed(format!("bad weight {:?}: {e}", &record[3])))?;

        if options.prune
            && (weight < options.min_edge_weight
                || is_blocked(&record[1])
                || is_blocked(&record[2]))
        {
            skipped += 1;
            continue;
        }
        if head == tail {
            skipped += 1;
            continue;
        }

        builder.add_edge(KnowledgeEdge::new(head, rel, tail).with_weight(weight))?;
        let reverse = if options.prune && relations.is_symmetric(rel) {
            KnowledgeEdge::new(tail, rel, head).with_weight(weight).merged()
        } else {
            let inverse = relations
                .inverse_of(rel)
                .ok_or(LoadError::RelationOutOfRange {
                    relation: rel.0,
                    relation_count: relations.len(),
                })?;
            KnowledgeEdge::new(tail, inverse, head).with_weight(weight)
        };
        builder.add_edge(reverse)?;
    }

    let graph = builder.build();
    tracing::info!(
        variant = %graph.variant(),
        edges = graph.edge_count(),
        skipped,
        "constructed knowledge graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{ConceptId, RelationId};
    use tempfile::TempDir;

    const DUMP: &str = "\
/a/1\t/r/IsA\t/c/en/dog/n\t/c/en/animal\t{\"weight\": 2.0}
/a/2\t/r/HasA\t/c/en/dog\t/c/en/tail\t{\"weight\": 1.0}
/a/3\t/r/IsA\t/c/fr/chien\t/c/en/dog\t{\"weight\": 1.0}
/a/4\t/r/Synonym\t/c/en/dog\t/c/en/hound\t{\"weight\": 0.25}
/a/5\t/r/ExternalURL\t/c/en/dog\t/c/en/cat\t{\"weight\": 1.0}
/a/6\t/r/IsA\t/c/en/3d\t/c/en/thing\t{\"weight\": 1.0}
/a/7\t/r/Antonym\t/c/en/hot\t/c/en/cold\t{\"weight\": 1.0}
";

    fn extract(dir: &TempDir) -> (ExtractReport, ConceptVocab, String) {
        let dump = dir.path().join("assertions.csv");
        std::fs::write(&dump, DUMP).unwrap();
        let csv_path = dir.path().join("conceptnet.en.csv");
        let vocab_path = dir.path().join("concept.txt");
        let report = extract_english(&dump, &csv_path, &vocab_path).unwrap();
        let vocab = ConceptVocab::load(&vocab_path).unwrap();
        (report, vocab, std::fs::read_to_string(csv_path).unwrap())
    }

    #[test]
    fn merge_table_maps_and_reverses() {
        let table = relation_merge_table();
        assert_eq!(table.get("synonym"), Some(&("relatedto", false)));
        assert_eq!(table.get("hasa"), Some(&("partof", true)));
        assert_eq!(table.get("motivatedbygoal"), Some(&("causes", true)));
        assert_eq!(table.get("isa"), Some(&("isa", false)));
        assert_eq!(table.get("externalurl"), None);
    }

    #[test]
    fn english_terms_are_normalized() {
        assert_eq!(english_term("/c/en/Ice_Cream/n"), Some("ice_cream".into()));
        assert_eq!(english_term("/c/en/well-known"), Some("well-known".into()));
        assert_eq!(english_term("/c/en/3d"), None);
        assert_eq!(english_term("/c/fr/chien"), None);
    }

    #[test]
    fn extraction_keeps_english_merged_relations() {
        let dir = TempDir::new().unwrap();
        let (report, vocab, csv) = extract(&dir);

        assert_eq!(report.assertions_read, 7);
        assert_eq!(report.assertions_kept, 4);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "isa\tdog\tanimal\t2");
        // HasA is merged into a reversed PartOf.
        assert_eq!(lines[1], "partof\ttail\tdog\t1");
        assert_eq!(lines[2], "relatedto\tdog\thound\t0.25");

        assert_eq!(vocab.lookup("dog"), Some(ConceptId(0)));
        assert_eq!(vocab.lookup("animal"), Some(ConceptId(1)));
        assert_eq!(vocab.lookup("tail"), Some(ConceptId(2)));
        assert_eq!(vocab.len(), 6);
    }

    #[test]
    fn unpruned_graph_has_inverse_edges() {
        let dir = TempDir::new().unwrap();
        let (_, vocab, _) = extract(&dir);
        let graph = construct_graph(
            &dir.path().join("conceptnet.en.csv"),
            &vocab,
            GraphBuildOptions {
                prune: false,
                min_edge_weight: 0.5,
            },
        )
        .unwrap();

        assert_eq!(graph.variant(), GraphVariant::Unpruned);
        assert_eq!(graph.edge_count(), 8);
        let dog = vocab.lookup("dog").unwrap();
        let animal = vocab.lookup("animal").unwrap();
        assert_eq!(graph.relations_between(dog, animal), vec![RelationId(5)]);
        assert_eq!(graph.relations_between(animal, dog), vec![RelationId(22)]);

        // Antonym is symmetric but the unpruned graph still uses the inverse ID.
        let hot = vocab.lookup("hot").unwrap();
        let cold = vocab.lookup("cold").unwrap();
        assert_eq!(graph.relations_between(cold, hot), vec![RelationId(17)]);
    }

    #[test]
    fn pruned_graph_drops_weak_edges_and_merges_symmetric_relations() {
        let dir = TempDir::new().unwrap();
        let (_, vocab, _) = extract(&dir);
        let graph = construct_graph(
            &dir.path().join("conceptnet.en.csv"),
            &vocab,
            GraphBuildOptions::default(),
        )
        .unwrap();

        assert_eq!(graph.variant(), GraphVariant::Pruned);
        let dog = vocab.lookup("dog").unwrap();
        let hound = vocab.lookup("hound").unwrap();
        assert!(!graph.has_edge(dog, hound), "weight 0.25 is below the threshold");

        let hot = vocab.lookup("hot").unwrap();
        let cold = vocab.lookup("cold").unwrap();
        let reverse = graph.edges_between(cold, hot);
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].relation, RelationId(0));
        assert!(reverse[0].merged);
    }

    #[test]
    fn stopword_concepts_are_blocked() {
        assert!(is_blocked("people"));
        assert!(is_blocked("the_dog"));
        assert!(!is_blocked("hot_dog"));
    }

    #[test]
    fn unknown_relation_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("bad.csv");
        std::fs::write(&csv_path, "flyingto\tdog\tcat\t1.0\n").unwrap();
        let vocab = ConceptVocab::from_concepts(["dog", "cat"]).unwrap();
        let err = construct_graph(&csv_path, &vocab, GraphBuildOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::UnknownRelation { .. }));
    }
}
