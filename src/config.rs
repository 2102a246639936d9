use std::env;
use std::path::PathBuf;

use crate::matcher::EVENT_THRESHOLD;
use crate::names::{NAME_THRESHOLD, PARTIAL_NAME_THRESHOLD};
use crate::reliability::TierBounds;

const DEFAULT_EVENTS_FILES: &[&str] = &["data/events/east_vs_west_events.json", "data/events/kott_events.json"];
const DEFAULT_TRANSCRIPTS_DIR: &str = "data/transcripts";
const DEFAULT_PREDICTOR_SUMMARY_FILE: &str = "data/predictor_summary.json";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Event files, concatenated in this order. The order fixes name resolution.
    pub events_files: Vec<PathBuf>,
    pub transcripts_dir: PathBuf,
    pub predictor_summary_file: PathBuf,
    pub name_aliases_file: Option<PathBuf>,
    pub name_threshold: f64,
    pub partial_name_threshold: f64,
    pub event_threshold: f64,
    pub tier_bounds: TierBounds,
    /// `None` uses rayon's global pool.
    pub worker_threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            events_files: DEFAULT_EVENTS_FILES.iter().map(PathBuf::from).collect(),
            transcripts_dir: PathBuf::from(DEFAULT_TRANSCRIPTS_DIR),
            predictor_summary_file: PathBuf::from(DEFAULT_PREDICTOR_SUMMARY_FILE),
            name_aliases_file: None,
            name_threshold: NAME_THRESHOLD,
            partial_name_threshold: PARTIAL_NAME_THRESHOLD,
            event_threshold: EVENT_THRESHOLD,
            tier_bounds: TierBounds::default(),
            worker_threads: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tier_bounds = TierBounds {
            low_min: f64_env("APP_TIER_LOW_MIN").unwrap_or(defaults.tier_bounds.low_min),
            high_min: f64_env("APP_TIER_HIGH_MIN").unwrap_or(defaults.tier_bounds.high_min),
        };
        Self {
            events_files: opt_env("APP_EVENTS_FILES")
                .map(|raw| split_paths(&raw))
                .filter(|paths| !paths.is_empty())
                .unwrap_or(defaults.events_files),
            transcripts_dir: opt_env("APP_TRANSCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.transcripts_dir),
            predictor_summary_file: opt_env("APP_PREDICTOR_SUMMARY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.predictor_summary_file),
            name_aliases_file: opt_env("APP_NAME_ALIASES_FILE").map(PathBuf::from),
            name_threshold: threshold_env("APP_NAME_THRESHOLD").unwrap_or(defaults.name_threshold),
            partial_name_threshold: threshold_env("APP_PARTIAL_NAME_THRESHOLD")
                .unwrap_or(defaults.partial_name_threshold),
            event_threshold: threshold_env("APP_EVENT_THRESHOLD").unwrap_or(defaults.event_threshold),
            tier_bounds,
            worker_threads: env::var("APP_WORKER_THREADS")
                .ok()
                .and_then(|val| val.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(|n| n.clamp(1, 64)),
        }
    }

    pub fn build_pool(&self) -> Option<rayon::ThreadPool> {
        let threads = self.worker_threads?;
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .ok()
    }
}

/// Run `action` on `pool` when there is one, otherwise on the global pool.
pub fn with_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val.trim().to_string()) })
}

fn f64_env(key: &str) -> Option<f64> {
    opt_env(key).and_then(|val| val.parse::<f64>().ok())
}

fn threshold_env(key: &str) -> Option<f64> {
    f64_env(key).filter(|v| (0.0..=100.0).contains(v))
}

fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_file_list_splits_on_commas_and_semicolons() {
        let paths = split_paths(" a.json, b.json;;c.json ");
        assert_eq!(
            paths,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json"), PathBuf::from("c.json")]
        );
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.name_threshold, 85.0);
        assert_eq!(cfg.partial_name_threshold, 75.0);
        assert_eq!(cfg.tier_bounds, TierBounds { low_min: 58.0, high_min: 70.0 });
        assert_eq!(cfg.events_files.len(), 2);
        assert!(cfg.build_pool().is_none());
    }
}
