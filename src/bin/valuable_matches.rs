use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use arm_analytics::relationship::MatchComparison;
use arm_analytics::{Corpus, EngineConfig};

const DEFAULT_OUT: &str = "data/valuable_matches.json";

#[derive(Serialize)]
struct Snapshot<'a> {
    generated_at: String,
    total_matches: usize,
    valuable_matches: usize,
    comparisons: Vec<&'a MatchComparison>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let out_path = parse_path_arg("out").unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    let include_all = std::env::args().skip(1).any(|arg| arg == "--all");

    let config = EngineConfig::from_env();
    let corpus = Corpus::load(&config)?;
    let comparisons = corpus.analyze_corpus_matches();
    let valuable = comparisons.iter().filter(|c| c.analysis.is_valuable()).count();

    let snapshot = Snapshot {
        generated_at: chrono::Utc::now().to_rfc3339(),
        total_matches: comparisons.len(),
        valuable_matches: valuable,
        comparisons: comparisons
            .iter()
            .filter(|c| include_all || c.analysis.is_valuable())
            .collect(),
    };

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = out_path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(&snapshot).context("serialize comparisons")?;
    fs::write(&tmp, json).context("write comparisons")?;
    fs::rename(&tmp, &out_path).context("swap comparisons")?;

    println!("Valuable match scan complete");
    println!("Events: {}", corpus.events().len());
    println!("Athletes: {}", corpus.index().resolver().len());
    println!("Skipped matches: {}", corpus.index().skipped_matches());
    println!("Matches compared: {}", snapshot.total_matches);
    println!("Valuable: {}", snapshot.valuable_matches);
    println!("Output: {}", out_path.display());
    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("--{name}=");
    let flag = format!("--{name}");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if *arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
