//! Runs fixture suites: `dev-test-runner [PATHS...] [--filter REGEX]`.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use regex::Regex;

use json_sieve::suite::Suite;

#[derive(Parser, Debug)]
struct Args {
    /// suite files (defaults to every fixtures/*.json next to the workspace root)
    paths: Vec<PathBuf>,

    /// only run cases whose name matches this regex
    #[arg(long)]
    filter: Option<String>,

    /// print accepted/rejected output for passing cases too
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> anyhow::Result<bool> {
    let filter = args.filter.as_deref().map(Regex::new).transpose().context("invalid --filter")?;
    let paths = if args.paths.is_empty() { default_fixtures()? } else { args.paths };

    let (mut passed, mut failed) = (0usize, 0usize);
    for path in &paths {
        let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let suite = Suite::from_json_str(&src).with_context(|| format!("invalid suite {}", path.display()))?;
        let report = suite
            .run_filtered(|name| filter.as_ref().is_none_or(|rx| rx.is_match(name)))
            .with_context(|| format!("failed to compile {}", path.display()))?;

        println!("{}", path.display().to_string().bold());
        for result in &report.results {
            match &result.failure {
                None => {
                    passed += 1;
                    println!("  {} {}", "✔".green(), result.name);
                    if args.verbose {
                        if let Some(outcome) = &result.outcome {
                            println!("      {}", outcome.report());
                        }
                    }
                }
                Some(reason) => {
                    failed += 1;
                    println!("  {} {}: {reason}", "✘".red(), result.name);
                }
            }
        }
    }

    println!("\n{passed} passed, {failed} failed");
    Ok(failed == 0)
}

fn default_fixtures() -> anyhow::Result<Vec<PathBuf>> {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures");
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("no fixtures directory at {dir}"))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
