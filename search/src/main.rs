use anyhow::{bail, Result};
use clap::Parser;
use shoal_core::persist::IndexPaths;
use shoal_core::scorer::Scorer;
use shoal_core::tiered::{TieredIndexSet, DEFAULT_MAX_N_GRAM, DEFAULT_PAGE_RANK_ITERATIONS};
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "shoal-search")]
#[command(about = "Interactive tiered-index search (!Next pages, !Exit quits)", long_about = None)]
struct Args {
    /// Index root directory (as produced by shoal-indexer)
    #[arg(long, default_value = "./index")]
    index: String,
    /// Results per page
    #[arg(long, default_value_t = 10)]
    k: usize,
    /// Longest n-gram the indexes were built with
    #[arg(long, default_value_t = DEFAULT_MAX_N_GRAM)]
    max_n_gram: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let paths = IndexPaths::new(&args.index);
    let tiered = TieredIndexSet::new(paths, args.max_n_gram, DEFAULT_PAGE_RANK_ITERATIONS)?;
    if tiered.doc_count() == 0 {
        bail!("no built indexes under {}; run shoal-indexer first", args.index);
    }
    tracing::info!(docs = tiered.doc_count(), "indexes loaded");

    let mut scorer = Scorer::new(&tiered);
    let mut last_query: Option<String> = None;

    let stdin = io::stdin();
    loop {
        print!("Search: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "!Exit" => break,
            "!Next" => {
                let Some(query) = last_query.clone() else {
                    println!("No previous query to page through.");
                    continue;
                };
                let start = Instant::now();
                let results = scorer.complete_search(&query, args.k)?;
                print_results(&results, start.elapsed());
            }
            query => {
                scorer.new_search();
                last_query = Some(query.to_string());
                let start = Instant::now();
                let results = scorer.sprint_search(query, args.k)?;
                print_results(&results, start.elapsed());
            }
        }
    }
    Ok(())
}

fn print_results(results: &[String], elapsed: Duration) {
    println!("Top results retrieved in {:.1}ms:", elapsed.as_secs_f64() * 1000.0);
    for (rank, url) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, url);
    }
    if results.is_empty() {
        println!("It doesn't look like there were any good results found for your phrase.");
    }
    println!("{}", "-".repeat(80));
}
