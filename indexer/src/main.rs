use anyhow::Result;
use clap::{Parser, Subcommand};
use shoal_core::persist::IndexPaths;
use shoal_core::tiered::{TieredIndexSet, Zone, DEFAULT_MAX_N_GRAM, DEFAULT_PAGE_RANK_ITERATIONS};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "shoal-indexer")]
#[command(about = "Build tiered inverted indexes from a fetched corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build all six zone indexes from the corpus directory
    Build {
        /// Directory of fetched page JSON files ({url, content, encoding})
        #[arg(long)]
        corpus: String,
        /// Index root directory
        #[arg(long, default_value = "./index")]
        output: String,
        /// Longest n-gram to index
        #[arg(long, default_value_t = DEFAULT_MAX_N_GRAM)]
        max_n_gram: usize,
        /// PageRank iteration count
        #[arg(long, default_value_t = DEFAULT_PAGE_RANK_ITERATIONS)]
        page_rank_iterations: usize,
    },
    /// Report document and term counts plus index file sizes
    Stats {
        /// Index root directory
        #[arg(long, default_value = "./index")]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, max_n_gram, page_rank_iterations } => {
            build(&corpus, &output, max_n_gram, page_rank_iterations)
        }
        Commands::Stats { index } => stats(&index),
    }
}

fn build(corpus: &str, output: &str, max_n_gram: usize, page_rank_iterations: usize) -> Result<()> {
    let paths = IndexPaths::new(output);
    paths.create_dirs()?;

    let mut tiered = TieredIndexSet::new(paths, max_n_gram, page_rank_iterations)?;
    let start = Instant::now();
    tiered.build_tiered_indexes(Path::new(corpus))?;
    tracing::info!(
        docs = tiered.doc_count(),
        elapsed_s = start.elapsed().as_secs_f64(),
        output,
        "tiered index build complete"
    );
    Ok(())
}

fn stats(index: &str) -> Result<()> {
    let paths = IndexPaths::new(index);
    let tiered = TieredIndexSet::new(paths, DEFAULT_MAX_N_GRAM, DEFAULT_PAGE_RANK_ITERATIONS)?;

    println!("Documents indexed: {}", tiered.doc_count());
    for zone in Zone::ALL {
        let zone = tiered.zone(zone);
        let size_kb = fs::metadata(zone.index_file_path())
            .map(|meta| meta.len() as f64 / 1000.0)
            .unwrap_or(0.0);
        println!("{:>10}: {} terms, {:.1} kB", zone.name(), zone.term_count(), size_kb);
    }
    Ok(())
}
