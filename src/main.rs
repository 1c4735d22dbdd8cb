// Command-line entry point for pdwalk.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdwalk::{
    flat_walks, write_distance_row, BatchOrchestrator, IngestOptions, LineSink, PushdownGraph,
    RawEdgeList, WalkConfig,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pushdown random walks from every label.
    Walk(WalkArgs),
    /// One flat sentence per function and round.
    Flat(FlatArgs),
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// Edge list (JSON) produced by the graph extractor
    #[arg(short, long)]
    graph: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Label prefixes to remove
    #[arg(long, num_args = 1..)]
    remove: Vec<String>,

    /// Drop type (GEP) labels
    #[arg(long)]
    no_types: bool,

    /// Drop opcode labels
    #[arg(long)]
    no_opcodes: bool,

    /// Drop conditional-branch labels
    #[arg(long)]
    no_ifs: bool,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl GraphArgs {
    fn remove_prefixes(&self) -> Vec<String> {
        let mut prefixes = self.remove.clone();
        for (off, prefix) in [
            (self.no_types, "F2V_GEP"),
            (self.no_opcodes, "F2V_INST"),
            (self.no_ifs, "F2V_CONDBR"),
        ] {
            if off {
                prefixes.push(prefix.to_owned());
            }
        }
        prefixes
    }

    fn load(&self, interprocedural: bool) -> Result<PushdownGraph> {
        let options = IngestOptions {
            remove_prefixes: self.remove_prefixes(),
            interprocedural,
        };
        RawEdgeList::from_path(&self.graph)
            .with_context(|| format!("failed to read edge list {}", self.graph.display()))?
            .into_graph(&options)
            .context("failed to build graph")
    }

    fn output(&self) -> Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
            )),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        })
    }
}

#[derive(Args, Debug)]
struct WalkArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Maximum path length
    #[arg(long, default_value_t = 200)]
    length: usize,

    /// Number of walks per label
    #[arg(long, default_value_t = 100)]
    walks: usize,

    /// Context-sensitive (interprocedural) walks
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    interprocedural: u8,

    /// Emit function enter/exit labels
    #[arg(long)]
    enter_exit: bool,

    /// Bias constant (1.0 is unbiased)
    #[arg(long, default_value_t = 1.0)]
    bias: f64,

    /// Write per-walk max stack distances to this file
    #[arg(long)]
    distances: Option<PathBuf>,

    /// Generate rounds on all cores
    #[arg(long)]
    parallel: bool,
}

#[derive(Args, Debug)]
struct FlatArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Sentences per function
    #[arg(long, default_value_t = 100)]
    rounds: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdwalk=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn run_walk(args: &WalkArgs) -> Result<()> {
    let config = WalkConfig {
        max_edges: args.length,
        walks_per_label: args.walks,
        interprocedural: args.interprocedural == 1,
        enter_exit_markers: args.enter_exit,
        bias_constant: args.bias,
        seed: args.graph.seed,
    };
    let graph = args.graph.load(config.interprocedural)?;
    let orchestrator = BatchOrchestrator::new(&graph, config)?;

    let out = args.graph.output()?;
    let mut sink = if args.distances.is_some() {
        LineSink::with_distances(out)
    } else {
        LineSink::new(out)
    };

    let stats = if args.parallel {
        run_parallel(&orchestrator, &mut sink)?
    } else {
        orchestrator.generate_all(&mut sink)?
    };
    sink.flush().context("failed to flush walks")?;
    tracing::info!(
        walks = stats.walks,
        written = stats.written,
        degenerate = stats.degenerate,
        "walks done"
    );

    if let Some(path) = &args.distances {
        write_distances(path, sink.distances())?;
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn run_parallel<W: Write>(o: &BatchOrchestrator<'_>, sink: &mut LineSink<W>) -> Result<pdwalk::BatchStats> {
    Ok(o.generate_all_parallel(sink)?)
}

#[cfg(not(feature = "parallel"))]
fn run_parallel<W: Write>(o: &BatchOrchestrator<'_>, sink: &mut LineSink<W>) -> Result<pdwalk::BatchStats> {
    tracing::warn!("built without the `parallel` feature; walking sequentially");
    Ok(o.generate_all(sink)?)
}

fn write_distances(path: &Path, distances: &[usize]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    write_distance_row(BufWriter::new(file), distances)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn run_flat(args: &FlatArgs) -> Result<()> {
    // Flat sentences never cross function boundaries.
    let graph = args.graph.load(false)?;
    let mut sink = LineSink::new(args.graph.output()?);
    flat_walks(&graph, args.rounds, args.graph.seed, &mut sink)?;
    sink.flush().context("failed to flush walks")?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match &cli.command {
        Command::Walk(args) => run_walk(args),
        Command::Flat(args) => run_flat(args),
    }
}
