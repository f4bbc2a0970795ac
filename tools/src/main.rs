use anyhow::{Context, Result};
use clap::Parser;
use gnn_driver::graph::dataset::{with_suffix, RawGraph, CACHE_SUFFIX};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parses a Cora-style dataset once and writes the binary cache that
/// `gnn` reads in place of the text files.
#[derive(Parser, Debug)]
#[command(name = "build-cache", version)]
struct Args {
    /// Dataset path prefix; `<prefix>.content` and `<prefix>.cites` are read
    #[arg(long, default_value = "data/cora")]
    data: PathBuf,

    /// Cache file to write (defaults to `<prefix>.ghd`)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let output = args
        .output
        .unwrap_or_else(|| with_suffix(&args.data, CACHE_SUFFIX));

    let graph = RawGraph::from_cora(&args.data)
        .with_context(|| format!("cannot parse dataset `{}`", args.data.display()))?;
    graph
        .save(&output)
        .with_context(|| format!("cannot write cache `{}`", output.display()))?;

    info!(
        "wrote {} nodes, {} edges, {} classes to {}",
        graph.num_nodes(),
        graph.edges.len(),
        graph.num_classes(),
        output.display()
    );
    Ok(())
}
