use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::events::Event;
use crate::matcher::EVENT_THRESHOLD;
use crate::names::{NAME_THRESHOLD, NameResolver};
use crate::predictions::PredictionStore;
use crate::similarity::{SimilarityScorer, default_scorer, normalize_name, titles_match};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReliabilityTier {
    #[default]
    Unranked,
    Low,
    High,
}

impl ReliabilityTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "high_ranked" => Some(Self::High),
            "low" | "low_ranked" => Some(Self::Low),
            "unranked" | "none" => Some(Self::Unranked),
            _ => None,
        }
    }
}

/// Success-rate cut-offs in percent. `low_min <= rate < high_min` is low,
/// `rate >= high_min` is high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierBounds {
    pub low_min: f64,
    pub high_min: f64,
}

impl Default for TierBounds {
    fn default() -> Self {
        Self {
            low_min: 58.0,
            high_min: 70.0,
        }
    }
}

impl TierBounds {
    pub fn classify(&self, success_rate: f64) -> ReliabilityTier {
        if success_rate >= self.high_min {
            ReliabilityTier::High
        } else if success_rate >= self.low_min {
            ReliabilityTier::Low
        } else {
            ReliabilityTier::Unranked
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictorStats {
    pub total_predictions: u32,
    pub correct_predictions: u32,
    pub success_rate: f64,
    pub tier: ReliabilityTier,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    total_predictions: u32,
    #[serde(default)]
    correct_predictions: u32,
    #[serde(default)]
    success_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_tier")]
    tier: Option<ReliabilityTier>,
}

fn lenient_tier<'de, D>(deserializer: D) -> std::result::Result<Option<ReliabilityTier>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(ReliabilityTier::parse))
}

fn success_rate(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = f64::from(correct) / f64::from(total) * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Predictor name -> historical accuracy bucket.
#[derive(Clone)]
pub struct ReliabilityRegistry {
    entries: BTreeMap<String, PredictorStats>,
    // normalized name -> registry key
    normalized: HashMap<String, String>,
    scorer: Arc<dyn SimilarityScorer>,
    name_threshold: f64,
}

impl std::fmt::Debug for ReliabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityRegistry")
            .field("entries", &self.entries)
            .field("name_threshold", &self.name_threshold)
            .finish()
    }
}

impl Default for ReliabilityRegistry {
    fn default() -> Self {
        Self::from_stats(BTreeMap::new())
    }
}

impl ReliabilityRegistry {
    pub fn from_stats(entries: BTreeMap<String, PredictorStats>) -> Self {
        let normalized = entries
            .keys()
            .map(|k| (normalize_name(k), k.clone()))
            .collect();
        Self {
            entries,
            normalized,
            scorer: default_scorer(),
            name_threshold: NAME_THRESHOLD,
        }
    }

    pub fn with_matching(mut self, scorer: Arc<dyn SimilarityScorer>, name_threshold: f64) -> Self {
        self.scorer = scorer;
        self.name_threshold = name_threshold;
        self
    }

    /// Parse `{name: {total_predictions, correct_predictions, success_rate, tier?}}`.
    /// Entries without a tier get one from `bounds`.
    pub fn from_json_str(raw: &str, bounds: TierBounds) -> Result<Self> {
        let parsed: BTreeMap<String, RawStats> =
            serde_json::from_str(raw).context("invalid predictor registry json")?;
        let entries = parsed
            .into_iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, raw)| {
                let rate = raw
                    .success_rate
                    .unwrap_or_else(|| success_rate(raw.correct_predictions, raw.total_predictions));
                let stats = PredictorStats {
                    total_predictions: raw.total_predictions,
                    correct_predictions: raw.correct_predictions,
                    success_rate: rate,
                    tier: raw.tier.unwrap_or_else(|| bounds.classify(rate)),
                };
                (name.trim().to_string(), stats)
            })
            .collect();
        Ok(Self::from_stats(entries))
    }

    pub fn load(path: &Path, bounds: TierBounds) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read predictor registry {}", path.display()))?;
        let registry = Self::from_json_str(&raw, bounds)
            .with_context(|| format!("parse predictor registry {}", path.display()))?;
        info!(path = %path.display(), predictors = registry.len(), "loaded predictor registry");
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.entries).context("serialize predictor registry")?;
        fs::write(&tmp, json).context("write predictor registry")?;
        fs::rename(&tmp, path).context("swap predictor registry")?;
        Ok(())
    }

    pub fn entries(&self) -> &BTreeMap<String, PredictorStats> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact key, then normalized key, then the best fuzzy key at or above
    /// the name threshold (ties to the alphabetically first key).
    pub fn lookup(&self, predictor: &str) -> Option<(&str, &PredictorStats)> {
        let trimmed = predictor.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some((key, stats)) = self.entries.get_key_value(trimmed) {
            return Some((key.as_str(), stats));
        }
        if let Some(key) = self.normalized.get(&normalize_name(trimmed))
            && let Some((key, stats)) = self.entries.get_key_value(key)
        {
            return Some((key.as_str(), stats));
        }
        let mut best: Option<(f64, &String, &PredictorStats)> = None;
        for (key, stats) in &self.entries {
            let score = self.scorer.score(trimmed, key);
            if score >= self.name_threshold && best.is_none_or(|(b, _, _)| score > b) {
                best = Some((score, key, stats));
            }
        }
        best.map(|(_, key, stats)| (key.as_str(), stats))
    }

    pub fn tier_of(&self, predictor: &str) -> ReliabilityTier {
        self.lookup(predictor)
            .map(|(_, stats)| stats.tier)
            .unwrap_or_default()
    }
}

/// Score every forecast that names a real result. A predictor is graded at
/// most once per (event, athlete pair), using the first such forecast.
pub fn grade(
    events: &[Event],
    store: &PredictionStore,
    resolver: &NameResolver,
    bounds: TierBounds,
) -> ReliabilityRegistry {
    let scorer = resolver.scorer().as_ref();
    let mut event_lookup: HashMap<String, Option<usize>> = HashMap::new();
    let mut graded: HashSet<(String, usize, String, String)> = HashSet::new();
    let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();

    for record in store.records() {
        let (Some(event), Some(predicted)) = (&record.event, &record.predicted_winner) else {
            continue;
        };
        let [p1, p2] = record.participants.as_slice() else {
            continue;
        };
        let event_idx = *event_lookup.entry(normalize_name(event)).or_insert_with(|| {
            events
                .iter()
                .position(|e| titles_match(scorer, &e.event_title, event, EVENT_THRESHOLD))
        });
        let Some(event_idx) = event_idx else {
            continue;
        };
        let Some(actual) = events[event_idx].matches.iter().find(|m| {
            let [a, b] = m.participants.as_slice() else {
                return false;
            };
            (resolver.same_identity(a, p1) && resolver.same_identity(b, p2))
                || (resolver.same_identity(a, p2) && resolver.same_identity(b, p1))
        }) else {
            continue;
        };
        if actual.winner.trim().is_empty() {
            continue;
        }

        let predictor = resolver.canonical_or_raw(&record.predictor);
        let mut pair = [
            resolver.canonical_or_raw(&actual.participants[0]),
            resolver.canonical_or_raw(&actual.participants[1]),
        ];
        pair.sort();
        let [first, second] = pair;
        if !graded.insert((predictor.clone(), event_idx, first, second)) {
            continue;
        }

        let correct = resolver.same_identity(predicted, &actual.winner);
        debug!(predictor = %predictor, event = %events[event_idx].event_title, correct, "graded forecast");
        let tally = tallies.entry(predictor).or_default();
        tally.0 += 1;
        if correct {
            tally.1 += 1;
        }
    }

    let entries = tallies
        .into_iter()
        .map(|(name, (total, correct))| {
            let rate = success_rate(correct, total);
            let stats = PredictorStats {
                total_predictions: total,
                correct_predictions: correct,
                success_rate: rate,
                tier: bounds.classify(rate),
            };
            (name, stats)
        })
        .collect();
    ReliabilityRegistry::from_stats(entries)
}
