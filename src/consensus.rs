use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::matcher::{Forecast, MatchedPredictions};
use crate::names::NameResolver;
use crate::reliability::{ReliabilityRegistry, ReliabilityTier};
use crate::similarity::normalize_name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusFavorite {
    Athlete(String),
    NoConsensus,
}

/// Distinct registered third-party predictors backing one athlete, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusMetadata {
    pub total_predictions: usize,
    pub self_count: usize,
    pub third_party_count: usize,
    pub unique_predictors: usize,
    /// Share of forecasts that carry a summary, rounded to three places.
    pub data_quality_score: f64,
    pub has_detailed_summaries: bool,
    pub has_athlete_opinions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusReport {
    pub athlete_a: String,
    pub athlete_b: String,
    pub event: String,
    pub match_found: bool,
    pub files: Vec<String>,
    pub self_predictions: Vec<Forecast>,
    pub third_party_predictions: Vec<Forecast>,
    pub votes_a: u32,
    pub votes_b: u32,
    pub favorite: ConsensusFavorite,
    pub confidence: f64,
    pub tier_counts_a: TierCounts,
    pub tier_counts_b: TierCounts,
    pub metadata: ConsensusMetadata,
}

impl ConsensusReport {
    pub fn total_votes(&self) -> u32 {
        self.votes_a + self.votes_b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    A,
    B,
}

pub struct ConsensusAggregator<'a> {
    resolver: &'a NameResolver,
    registry: &'a ReliabilityRegistry,
}

impl<'a> ConsensusAggregator<'a> {
    pub fn new(resolver: &'a NameResolver, registry: &'a ReliabilityRegistry) -> Self {
        Self { resolver, registry }
    }

    /// Report for a matcher result, keeping its event and file list.
    pub fn aggregate_matched(&self, matched: MatchedPredictions) -> ConsensusReport {
        let mut report = self.aggregate(
            matched.self_predictions,
            matched.third_party_predictions,
            &matched.athlete_a,
            &matched.athlete_b,
        );
        report.event = matched.event;
        report.files = matched.files;
        report
    }

    pub fn aggregate(
        &self,
        self_predictions: Vec<Forecast>,
        third_party_predictions: Vec<Forecast>,
        athlete_a: &str,
        athlete_b: &str,
    ) -> ConsensusReport {
        let self_predictions = dedup_forecasts(self_predictions);
        let third_party_predictions = dedup_forecasts(third_party_predictions);

        let (mut votes_a, mut votes_b) = (0u32, 0u32);
        for forecast in self_predictions.iter().chain(&third_party_predictions) {
            match self.side_of(forecast.predicted_winner.as_deref(), athlete_a, athlete_b) {
                Some(Side::A) => votes_a += 1,
                Some(Side::B) => votes_b += 1,
                None => {}
            }
        }

        let canonical_a = self.resolver.canonical_or_raw(athlete_a);
        let canonical_b = self.resolver.canonical_or_raw(athlete_b);
        let favorite = if votes_a > votes_b {
            ConsensusFavorite::Athlete(canonical_a.clone())
        } else if votes_b > votes_a {
            ConsensusFavorite::Athlete(canonical_b.clone())
        } else {
            ConsensusFavorite::NoConsensus
        };
        let total = votes_a + votes_b;
        let confidence = if total == 0 {
            0.0
        } else {
            f64::from(votes_a.max(votes_b)) / f64::from(total)
        };

        let (tier_counts_a, tier_counts_b) = self.tier_counts(&third_party_predictions, athlete_a, athlete_b);
        let metadata = metadata(&self_predictions, &third_party_predictions);

        ConsensusReport {
            athlete_a: canonical_a,
            athlete_b: canonical_b,
            event: String::new(),
            match_found: metadata.total_predictions > 0,
            files: Vec::new(),
            self_predictions,
            third_party_predictions,
            votes_a,
            votes_b,
            favorite,
            confidence,
            tier_counts_a,
            tier_counts_b,
            metadata,
        }
    }

    fn side_of(&self, winner: Option<&str>, athlete_a: &str, athlete_b: &str) -> Option<Side> {
        let winner = winner?;
        if self.resolver.same_identity(winner, athlete_a) {
            Some(Side::A)
        } else if self.resolver.same_identity(winner, athlete_b) {
            Some(Side::B)
        } else {
            None
        }
    }

    fn tier_counts(&self, third_party: &[Forecast], athlete_a: &str, athlete_b: &str) -> (TierCounts, TierCounts) {
        let mut seen: HashSet<(Side, String)> = HashSet::new();
        let (mut a, mut b) = (TierCounts::default(), TierCounts::default());
        for forecast in third_party {
            let in_own_match = forecast
                .participants
                .iter()
                .any(|p| self.resolver.same_identity(&forecast.predictor, p));
            if in_own_match {
                continue;
            }
            let Some(side) = self.side_of(forecast.predicted_winner.as_deref(), athlete_a, athlete_b) else {
                continue;
            };
            let Some((key, stats)) = self.registry.lookup(&forecast.predictor) else {
                continue;
            };
            if !seen.insert((side, key.to_string())) {
                continue;
            }
            let counts = match side {
                Side::A => &mut a,
                Side::B => &mut b,
            };
            match stats.tier {
                ReliabilityTier::Low => counts.low += 1,
                ReliabilityTier::High => counts.high += 1,
                ReliabilityTier::Unranked => {}
            }
        }
        (a, b)
    }
}

/// Collapse forecasts sharing (predictor, predicted winner). The survivor
/// keeps the first-seen position and carries the longest summary; ties keep
/// the first seen.
pub fn dedup_forecasts(forecasts: Vec<Forecast>) -> Vec<Forecast> {
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut out: Vec<Forecast> = Vec::with_capacity(forecasts.len());
    for forecast in forecasts {
        let key = (
            normalize_name(&forecast.predictor),
            normalize_name(forecast.predicted_winner.as_deref().unwrap_or_default()),
        );
        match slots.get(&key) {
            Some(&idx) => {
                if summary_len(&forecast) > summary_len(&out[idx]) {
                    out[idx] = forecast;
                }
            }
            None => {
                slots.insert(key, out.len());
                out.push(forecast);
            }
        }
    }
    out
}

// Absent summaries rank below an empty one.
fn summary_len(forecast: &Forecast) -> Option<usize> {
    forecast.prediction_summary.as_ref().map(|s| s.chars().count())
}

fn metadata(self_predictions: &[Forecast], third_party: &[Forecast]) -> ConsensusMetadata {
    let all = || self_predictions.iter().chain(third_party);
    let total = self_predictions.len() + third_party.len();
    let detailed = all().filter(|f| f.prediction_summary.is_some()).count();
    let unique_predictors = all()
        .map(|f| normalize_name(&f.predictor))
        .filter(|p| !p.is_empty())
        .collect::<HashSet<_>>()
        .len();
    let data_quality_score = if total == 0 {
        0.0
    } else {
        (detailed as f64 / total as f64 * 1000.0).round() / 1000.0
    };
    ConsensusMetadata {
        total_predictions: total,
        self_count: self_predictions.len(),
        third_party_count: third_party.len(),
        unique_predictors,
        data_quality_score,
        has_detailed_summaries: detailed > 0,
        has_athlete_opinions: all().any(|f| !f.opinion_about_athletes.is_empty()),
    }
}
