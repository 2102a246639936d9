use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use arm_analytics::reliability::ReliabilityTier;
use arm_analytics::{Corpus, EngineConfig};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env();
    let out_path = parse_path_arg("out").unwrap_or_else(|| config.predictor_summary_file.clone());

    let corpus = Corpus::load(&config)?;
    let registry = corpus.grade_predictors(config.tier_bounds);
    registry.save(&out_path)?;

    let count_tier = |tier: ReliabilityTier| registry.entries().values().filter(|s| s.tier == tier).count();
    println!("Predictor grading complete");
    println!("Forecasts loaded: {}", corpus.store().len());
    println!("Files skipped or partially read: {}", corpus.store().warnings().len());
    println!("Predictors graded: {}", registry.len());
    println!(
        "Tiers: high={} low={} unranked={}",
        count_tier(ReliabilityTier::High),
        count_tier(ReliabilityTier::Low),
        count_tier(ReliabilityTier::Unranked)
    );
    println!("Output: {}", out_path.display());

    let mut ranked = registry.entries().iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| {
        b.1.success_rate
            .total_cmp(&a.1.success_rate)
            .then_with(|| b.1.total_predictions.cmp(&a.1.total_predictions))
    });
    for (name, stats) in ranked.iter().take(10) {
        println!(
            "  {name}: {}/{} ({:.2}%) {:?}",
            stats.correct_predictions, stats.total_predictions, stats.success_rate, stats.tier
        );
    }
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
