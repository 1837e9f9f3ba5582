//! kgpath CLI: ConceptNet path finding and schema-graph construction.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::Result;

use kgpath::config::PipelineConfig;
use kgpath::graph::GraphVariant;
use kgpath::graph::store::{GraphStats, KnowledgeStore};
use kgpath::layout::{DataLayout, DatasetPaths};
use kgpath::paths::ScoreAggregation;
use kgpath::pipeline::{Embeddings, Pipeline, StageReport, WorkerPool, stages};
use kgpath::subgraph::Normalization;

#[derive(Parser)]
#[command(name = "kgpath", version, about = "ConceptNet path finding for commonsense QA")]
struct Cli {
    /// Pipeline configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of all artifacts.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Knowledge base name; namespaces output directories.
    #[arg(long, global = true)]
    kb: Option<String>,

    /// Worker threads.
    #[arg(long, global = true)]
    nprocs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ConceptNet ingestion.
    Conceptnet {
        #[command(subcommand)]
        action: ConceptnetAction,
    },

    /// Show statistics of a stored knowledge graph.
    GraphInfo {
        #[command(flatten)]
        kg: KgArgs,
    },

    /// Find bounded-length paths between grounded concepts.
    FindPaths {
        #[command(flatten)]
        kg: KgArgs,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Grounded examples (NDJSON).
        #[arg(long)]
        grounded: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score paths with TransE embeddings.
    ScorePaths {
        #[command(flatten)]
        kg: KgArgs,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Entity embeddings (.npy).
        #[arg(long)]
        ent_emb: Option<PathBuf>,
        /// Relation embeddings (.npy).
        #[arg(long)]
        rel_emb: Option<PathBuf>,
        /// How hop scores combine: product, mean or min.
        #[arg(long)]
        aggregation: Option<ScoreAggregation>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Drop paths scoring below a threshold.
    PrunePaths {
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Build schema graphs from pruned paths.
    BuildGraph {
        #[command(flatten)]
        kg: KgArgs,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        subgraph: SubgraphArgs,
        #[arg(long)]
        grounded: Option<PathBuf>,
        /// Pruned paths (NDJSON).
        #[arg(long)]
        paths: Option<PathBuf>,
        #[command(flatten)]
        out: GraphOutArgs,
    },

    /// Build schema graphs from the shared neighbors of grounded concepts.
    BuildTwoHop {
        #[command(flatten)]
        kg: KgArgs,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        subgraph: SubgraphArgs,
        #[arg(long)]
        grounded: Option<PathBuf>,
        #[command(flatten)]
        out: GraphOutArgs,
    },

    /// Extract (head, relation, tail) triples from schema graphs.
    ExtractTriples {
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        graph: GraphInArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List relation sequences between question and answer nodes of schema graphs.
    RelationalPaths {
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        graph: GraphInArgs,
        #[arg(long)]
        max_hops: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run every stage for a dataset, skipping stages whose outputs exist.
    Run {
        /// Dataset name (defaults to the configured one).
        #[arg(long)]
        dataset: Option<String>,
        /// Splits to process, in order (defaults to the configured ones).
        #[arg(long, value_delimiter = ',')]
        splits: Vec<String>,
        #[command(flatten)]
        search: SearchArgs,
        /// Re-run stages even if their outputs exist.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ConceptnetAction {
    /// Extract English assertions and the concept vocabulary.
    Extract {
        /// Raw ConceptNet assertions dump.
        #[arg(long)]
        assertions: Option<PathBuf>,
        #[arg(long)]
        output_csv: Option<PathBuf>,
        #[arg(long)]
        output_vocab: Option<PathBuf>,
    },
    /// Build the binary knowledge graph.
    Build {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        vocab: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep every assertion and a separate inverse for every relation.
        #[arg(long)]
        unpruned: bool,
        /// Pruned graph only: drop assertions below this confidence.
        #[arg(long)]
        min_edge_weight: Option<f32>,
    },
}

/// Knowledge graph and vocabulary files.
#[derive(Args)]
struct KgArgs {
    #[arg(long = "kg")]
    graph: Option<PathBuf>,
    #[arg(long)]
    vocab: Option<PathBuf>,
    /// Use the unpruned graph for default paths.
    #[arg(long)]
    unpruned: bool,
}

/// Dataset and split used to derive default artifact paths.
#[derive(Args)]
struct SplitArgs {
    #[arg(long)]
    dataset: Option<String>,
    #[arg(long, default_value = "dev")]
    split: String,
}

/// Path-search settings; they also name the artifact directories.
#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    min_path_length: Option<usize>,
    #[arg(long)]
    max_path_length: Option<usize>,
    #[arg(long)]
    max_num_paths: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct SubgraphArgs {
    #[arg(long)]
    max_node_num: Option<usize>,
    /// Adjacency normalization: row or sym.
    #[arg(long)]
    normalization: Option<Normalization>,
}

#[derive(Args)]
struct GraphOutArgs {
    /// Node lists (NDJSON).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Adjacencies (binary).
    #[arg(long)]
    adj_output: Option<PathBuf>,
}

#[derive(Args)]
struct GraphInArgs {
    /// Node lists (NDJSON).
    #[arg(long)]
    graph: Option<PathBuf>,
    /// Adjacencies (binary).
    #[arg(long)]
    adj: Option<PathBuf>,
}

impl SearchArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.min_path_length {
            config.min_path_length = v;
        }
        if let Some(v) = self.max_path_length {
            config.max_path_length = v;
        }
        if let Some(v) = self.max_num_paths {
            config.max_num_paths = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

impl SubgraphArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.max_node_num {
            config.max_node_num = v;
        }
        if let Some(v) = self.normalization {
            config.normalization = v;
        }
    }
}

/// Resolved inputs shared by the subcommands.
struct Context {
    config: PipelineConfig,
    layout: DataLayout,
}

impl Context {
    /// Artifact paths of the selected dataset; creates its directories.
    fn dataset(&self, split: &SplitArgs) -> Result<DatasetPaths> {
        let name = split.dataset.as_deref().unwrap_or(&self.config.dataset);
        self.layout.ensure_dirs(name)?;
        Ok(self.layout.dataset(name))
    }

    fn store(&self, kg: &KgArgs) -> Result<KnowledgeStore> {
        let kb = self.layout.kb();
        let variant = if kg.unpruned {
            GraphVariant::Unpruned
        } else {
            GraphVariant::Pruned
        };
        let graph = kg.graph.clone().unwrap_or_else(|| kb.graph(variant));
        let vocab = kg.vocab.clone().unwrap_or(kb.vocab);
        Ok(KnowledgeStore::load(&graph, &vocab)?)
    }

    fn pool(&self) -> Result<WorkerPool> {
        Ok(WorkerPool::new(self.config.nprocs)?)
    }
}

fn or(path: &Option<PathBuf>, default: PathBuf) -> PathBuf {
    path.clone().unwrap_or(default)
}

fn print_report(report: &StageReport) {
    println!(
        "{}: {} examples, {} items in {:.2?}",
        report.stage, report.examples, report.items, report.elapsed
    );
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::load(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

/// Fold command-line settings into the configuration before it is validated.
fn apply_overrides(cli: &Cli, config: &mut PipelineConfig) {
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(kb) = &cli.kb {
        config.kb = kb.clone();
    }
    if let Some(n) = cli.nprocs {
        config.nprocs = n;
    }
    match &cli.command {
        Commands::PrunePaths {
            search, threshold, ..
        } => {
            search.apply(config);
            if let Some(t) = threshold {
                config.path_prune_threshold = *t;
            }
        }
        Commands::FindPaths { search, .. }
        | Commands::ScorePaths { search, .. }
        | Commands::ExtractTriples { search, .. }
        | Commands::RelationalPaths { search, .. }
        | Commands::Run { search, .. } => search.apply(config),
        Commands::BuildGraph {
            search, subgraph, ..
        }
        | Commands::BuildTwoHop {
            search, subgraph, ..
        } => {
            search.apply(config);
            subgraph.apply(config);
        }
        Commands::Conceptnet {
            action: ConceptnetAction::Build {
                min_edge_weight: Some(w),
                ..
            },
        } => config.min_edge_weight = *w,
        _ => {}
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);
    config.validate()?;

    let ctx = Context {
        layout: DataLayout::new(&config),
        config,
    };
    let kb = ctx.layout.kb();

    match cli.command {
        Commands::Conceptnet { action } => match action {
            ConceptnetAction::Extract {
                assertions,
                output_csv,
                output_vocab,
            } => {
                ctx.layout.ensure_dirs(&ctx.config.dataset)?;
                let report = stages::extract_conceptnet(
                    &or(&assertions, kb.assertions.clone()),
                    &or(&output_csv, kb.english_csv.clone()),
                    &or(&output_vocab, kb.vocab.clone()),
                )?;
                print_report(&report);
            }
            ConceptnetAction::Build {
                csv,
                vocab,
                output,
                unpruned,
                ..
            } => {
                ctx.layout.ensure_dirs(&ctx.config.dataset)?;
                let variant = if unpruned {
                    GraphVariant::Unpruned
                } else {
                    GraphVariant::Pruned
                };
                let report = stages::build_knowledge_graph(
                    &or(&csv, kb.english_csv.clone()),
                    &or(&vocab, kb.vocab.clone()),
                    &or(&output, kb.graph(variant)),
                    ctx.config.graph_build(!unpruned),
                )?;
                print_report(&report);
            }
        },

        Commands::GraphInfo { kg } => {
            let store = ctx.store(&kg)?;
            println!("{}", GraphStats::of(&store.graph));
        }

        Commands::FindPaths {
            kg,
            split,
            grounded,
            output,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let store = ctx.store(&kg)?;
            let report = stages::find_paths(
                &ctx.pool()?,
                &store,
                &or(&grounded, ds.grounded(&split.split)),
                &or(&output, ds.raw_paths(&split.split)),
                ctx.config.path_finder(),
            )?;
            print_report(&report);
        }

        Commands::ScorePaths {
            kg,
            split,
            ent_emb,
            rel_emb,
            aggregation,
            input,
            output,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let store = ctx.store(&kg)?;
            let embeddings = Embeddings::load(
                &or(&ent_emb, kb.entity_embeddings()),
                &or(&rel_emb, kb.relation_embeddings()),
            )?;
            let report = stages::score_paths(
                &ctx.pool()?,
                store.graph.relations(),
                &embeddings,
                &or(&input, ds.raw_paths(&split.split)),
                &or(&output, ds.scored_paths(&split.split)),
                aggregation.unwrap_or(ctx.config.score_aggregation),
            )?;
            print_report(&report);
        }

        Commands::PrunePaths {
            split,
            input,
            output,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let report = stages::prune_paths(
                &or(&input, ds.scored_paths(&split.split)),
                &or(&output, ds.pruned_paths(&split.split)),
                ctx.config.path_prune_threshold,
            )?;
            print_report(&report);
        }

        Commands::BuildGraph {
            kg,
            split,
            grounded,
            paths,
            out,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let store = ctx.store(&kg)?;
            let report = stages::build_graph(
                &ctx.pool()?,
                &store,
                &or(&grounded, ds.grounded(&split.split)),
                &or(&paths, ds.pruned_paths(&split.split)),
                &or(&out.output, ds.graph(&split.split)),
                &or(&out.adj_output, ds.adjacency(&split.split)),
                ctx.config.subgraph(),
            )?;
            print_report(&report);
        }

        Commands::BuildTwoHop {
            kg,
            split,
            grounded,
            out,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let store = ctx.store(&kg)?;
            let report = stages::build_two_hop(
                &ctx.pool()?,
                &store,
                &or(&grounded, ds.grounded(&split.split)),
                &or(&out.output, ds.two_hop_graph(&split.split)),
                &or(&out.adj_output, ds.two_hop_adjacency(&split.split)),
                ctx.config.subgraph(),
            )?;
            print_report(&report);
        }

        Commands::ExtractTriples {
            split,
            graph,
            output,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let report = stages::extract_triples(
                &ctx.pool()?,
                &or(&graph.graph, ds.graph(&split.split)),
                &or(&graph.adj, ds.adjacency(&split.split)),
                &or(&output, ds.triples(&split.split)),
            )?;
            print_report(&report);
        }

        Commands::RelationalPaths {
            split,
            graph,
            max_hops,
            output,
            ..
        } => {
            let ds = ctx.dataset(&split)?;
            let report = stages::extract_relational_paths(
                &ctx.pool()?,
                &or(&graph.graph, ds.graph(&split.split)),
                &or(&graph.adj, ds.adjacency(&split.split)),
                &or(&output, ds.relational_paths(&split.split)),
                max_hops.unwrap_or(ctx.config.relational_path_max_hops),
            )?;
            print_report(&report);
        }

        Commands::Run {
            dataset,
            splits,
            force,
            ..
        } => {
            let dataset = dataset.unwrap_or_else(|| ctx.config.dataset.clone());
            let splits = if splits.is_empty() {
                ctx.config.splits.clone()
            } else {
                splits
            };
            let mut pipeline = Pipeline::new(ctx.config, force)?;
            let reports = pipeline.run(&dataset, &splits)?;
            for report in &reports {
                print_report(report);
            }
            println!("{} stages run for {dataset}", reports.len());
        }
    }

    Ok(())
}
