//! CLI smoke entry point.
//!
//! # Responsibility
//! - Feed stdin lines through an in-memory aggregation engine.
//! - Print deterministic per-level counts for quick local sanity checks.
//!
//! Usage: `logtree_cli [FACTOR] < entries.txt`

use logtree_core::{AggregationService, InMemoryNodeStore, DEFAULT_AGGREGATION_FACTOR};
use std::io::BufRead;
use std::process::ExitCode;

fn main() -> ExitCode {
    let factor = match std::env::args().nth(1) {
        Some(raw) => match raw.parse::<usize>() {
            Ok(factor) => factor,
            Err(_) => {
                eprintln!("factor must be a positive integer, got `{raw}`");
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_AGGREGATION_FACTOR,
    };

    let service = match AggregationService::with_factor(InMemoryNodeStore::new(), factor) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut ingested = 0usize;
    let mut summaries = 0usize;
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("failed to read stdin: {err}");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match service.ingest(line) {
            Ok(outcome) => {
                ingested += 1;
                summaries += outcome.summary_ids.len();
            }
            Err(err) => {
                eprintln!("ingest failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    let stats = match service.stats() {
        Ok(stats) => stats,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!("logtree_core version={}", logtree_core::core_version());
    println!("factor={factor} logs={ingested} summaries={summaries} nodes={}", stats.total_nodes);
    for (level, count) in &stats.levels {
        println!(
            "level={level} nodes={} frontier={}",
            count.total, count.frontier
        );
    }
    ExitCode::SUCCESS
}
