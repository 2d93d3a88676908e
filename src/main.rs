use louvx::communities::{vertex_following, AlgoLouvain};
use louvx::graph::{loader, CsrGraph};
use louvx::shared_slice::ProceduralMemoryMut;
use louvx::utils::{ISOLATED, UNASSIGNED};

use clap::{Parser, ValueEnum};
use static_assertions::const_assert;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

// vertex and cluster ids are stored as u64 and indexed as usize
const_assert!(std::mem::size_of::<usize>() >= std::mem::size_of::<u64>());

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Algo {
    /// Cautious parallel local moving.
    Naive,
}

#[derive(Parser)]
#[command(
    name = "louvx",
    version = "0.1",
    about = "Louvain community detection over symmetric weighted graphs"
)]
struct ProgramArgs {
    /// Input graph file (whitespace edge list: `src dst [weight]` per line)
    file: String,

    /// Algorithm selector
    #[arg(long, value_enum, default_value_t = Algo::Naive)]
    algo: Algo,

    /// Run the vertex-following preprocessor before clustering
    #[arg(long)]
    enable_vf: bool,

    /// Threshold for modularity gain
    #[arg(long, default_value_t = AlgoLouvain::DEFAULT_THRESHOLD)]
    c_threshold: f64,

    /// Smallest contracted graph worth another phase
    #[arg(long, default_value_t = AlgoLouvain::DEFAULT_MIN_GRAPH_SIZE)]
    min_graph_size: usize,

    /// Worker thread count, defaults to the physical core count
    #[arg(short, long)]
    threads: Option<usize>,

    /// Enable per-iteration progress output
    #[arg(short, long)]
    verbose: bool,

    /// Write the final `vertex cluster` assignment to this file
    #[arg(short, long)]
    output: Option<String>,
}

fn run(args: &ProgramArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Reading from file: {}", args.file);
    println!(
        "[WARNING:] Make sure {} is a symmetric graph without duplicate edges",
        args.file
    );
    let graph: CsrGraph = loader::from_file(&args.file, args.threads)?;
    println!("Read {} nodes, {} edges", graph.size(), graph.width());

    if args.enable_vf {
        let mut clusters = ProceduralMemoryMut::from_value(graph.size(), UNASSIGNED);
        let collapsed = vertex_following(&graph, &mut clusters)?;
        println!("Isolated nodes : {collapsed}");
    }

    let start = Instant::now();
    let louvain = AlgoLouvain::with_conf(
        &graph,
        args.threads,
        args.c_threshold,
        args.min_graph_size,
    )?;
    let elapsed = start.elapsed();

    println!(
        "Modularity {:.6} over {} communities in {:.3}s",
        louvain.partition_modularity(),
        louvain.community_count(),
        elapsed.as_secs_f64()
    );

    if let Some(output) = &args.output {
        let mut out = BufWriter::new(File::create(output)?);
        for (vertex, &cluster) in louvain.clusters().iter().enumerate() {
            if cluster == ISOLATED {
                writeln!(out, "{vertex} -")?;
            } else {
                writeln!(out, "{vertex} {cluster}")?;
            }
        }
        out.flush()?;
        println!("Cluster assignment written to {output}");
    }

    Ok(())
}

fn main() {
    let args = ProgramArgs::parse();

    // the engine reads this to decide whether to print iteration tables
    std::env::set_var("LOUVX_VERBOSE", if args.verbose { "1" } else { "0" });

    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
