use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::names::NameResolver;
use crate::predictions::{AthleteOpinion, PredictionRecord, PredictionStore};
use crate::similarity::titles_match;

pub const EVENT_THRESHOLD: f64 = 85.0;

/// Forecast as handed to consumers. Every field is always present; unknown
/// values serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Forecast {
    pub predictor: String,
    #[serde(rename = "match")]
    pub participants: Vec<String>,
    pub arm: Option<String>,
    pub event: Option<String>,
    pub predicted_winner: Option<String>,
    pub predicted_score: Option<String>,
    pub prediction_summary: Option<String>,
    pub predicted_duration: Option<String>,
    pub style_conflict: Option<String>,
    pub confidence: Option<String>,
    pub reasoning: Option<String>,
    pub opinion_about_athletes: BTreeMap<String, AthleteOpinion>,
    pub source_file: String,
}

impl From<&PredictionRecord> for Forecast {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            predictor: record.predictor.clone(),
            participants: record.participants.clone(),
            arm: record.arm.clone(),
            event: record.event.clone(),
            predicted_winner: record.predicted_winner.clone(),
            predicted_score: record.predicted_score.clone(),
            prediction_summary: record.prediction_summary.clone(),
            predicted_duration: record.predicted_duration.clone(),
            style_conflict: record.style_conflict.clone(),
            confidence: record.confidence.clone(),
            reasoning: record.reasoning.clone(),
            opinion_about_athletes: record.opinion_about_athletes.clone(),
            source_file: record.source_file.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPredictions {
    pub athlete_a: String,
    pub athlete_b: String,
    pub event: String,
    pub self_predictions: Vec<Forecast>,
    pub third_party_predictions: Vec<Forecast>,
    /// Distinct source files that contributed a match, in store order.
    pub files: Vec<String>,
    pub match_found: bool,
}

pub struct PredictionMatcher<'a> {
    resolver: &'a NameResolver,
    event_threshold: f64,
}

impl<'a> PredictionMatcher<'a> {
    pub fn new(resolver: &'a NameResolver) -> Self {
        Self {
            resolver,
            event_threshold: EVENT_THRESHOLD,
        }
    }

    pub fn with_event_threshold(mut self, threshold: f64) -> Self {
        self.event_threshold = threshold;
        self
    }

    pub fn find(
        &self,
        athlete_a: &str,
        athlete_b: &str,
        event: &str,
        store: &PredictionStore,
    ) -> MatchedPredictions {
        let mut out = MatchedPredictions {
            athlete_a: athlete_a.trim().to_string(),
            athlete_b: athlete_b.trim().to_string(),
            event: event.trim().to_string(),
            self_predictions: Vec::new(),
            third_party_predictions: Vec::new(),
            files: Vec::new(),
            match_found: false,
        };

        for record in store.records() {
            if !self.matches(record, athlete_a, athlete_b, event) {
                continue;
            }
            let is_self = self.resolver.same_identity(&record.predictor, athlete_a)
                || self.resolver.same_identity(&record.predictor, athlete_b);
            let forecast = Forecast::from(record);
            if is_self {
                out.self_predictions.push(forecast);
            } else {
                out.third_party_predictions.push(forecast);
            }
            if !out.files.contains(&record.source_file) {
                out.files.push(record.source_file.clone());
            }
        }

        out.match_found = !out.self_predictions.is_empty() || !out.third_party_predictions.is_empty();
        debug!(
            athlete_a,
            athlete_b,
            event,
            self_count = out.self_predictions.len(),
            third_party_count = out.third_party_predictions.len(),
            "matched forecasts"
        );
        out
    }

    fn matches(&self, record: &PredictionRecord, athlete_a: &str, athlete_b: &str, event: &str) -> bool {
        let Some(record_event) = record.event.as_deref() else {
            return false;
        };
        let [p1, p2] = record.participants.as_slice() else {
            return false;
        };
        if !titles_match(self.resolver.scorer().as_ref(), record_event, event, self.event_threshold) {
            return false;
        }
        let found = |athlete: &str| {
            self.resolver.same_identity(athlete, p1) || self.resolver.same_identity(athlete, p2)
        };
        found(athlete_a) && found(athlete_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictions::PredictionSection;

    fn record(predictor: &str, pair: [&str; 2], event: Option<&str>, file: &str) -> PredictionRecord {
        PredictionRecord {
            predictor: predictor.to_string(),
            participants: pair.iter().map(|s| s.to_string()).collect(),
            arm: Some("Right".to_string()),
            event: event.map(str::to_string),
            predicted_winner: Some(pair[0].to_string()),
            predicted_score: None,
            prediction_summary: None,
            predicted_duration: None,
            style_conflict: None,
            confidence: None,
            reasoning: None,
            opinion_about_athletes: BTreeMap::new(),
            source_file: file.to_string(),
            section: PredictionSection::ThirdParty,
        }
    }

    #[test]
    fn matches_unordered_pair_and_fuzzy_event() {
        let store = PredictionStore::from_records(vec![
            record("Engin Terzi", ["Levan Saginashvili", "Devon Larratt"], Some("east vs west 10"), "a.json"),
            record("Engin Terzi", ["Devon Laratt", "Levan Saginashvili"], Some("East vs West 10"), "a.json"),
            record("Engin Terzi", ["Devon Larratt", "Levan Saginashvili"], Some("East vs West 11"), "b.json"),
            record("Engin Terzi", ["Devon Larratt", "Levan Saginashvili"], None, "c.json"),
        ]);
        let resolver = NameResolver::default();
        let found = PredictionMatcher::new(&resolver).find(
            "Devon Larratt",
            "Levan Saginashvili",
            "East vs West 10",
            &store,
        );
        assert!(found.match_found);
        assert_eq!(found.third_party_predictions.len(), 2);
        assert_eq!(found.files, vec!["a.json".to_string()]);
    }

    #[test]
    fn predictor_in_the_match_is_self() {
        let store = PredictionStore::from_records(vec![record(
            "Devon Laratt",
            ["Devon Larratt", "Levan Saginashvili"],
            Some("EvW 10"),
            "a.json",
        )]);
        let resolver = NameResolver::default();
        let found = PredictionMatcher::new(&resolver).find("Levan Saginashvili", "Devon Larratt", "EvW 10", &store);
        assert_eq!(found.self_predictions.len(), 1);
        assert!(found.third_party_predictions.is_empty());
    }

    #[test]
    fn missing_fields_serialize_as_null() {
        let forecast = Forecast::from(&record("X", ["A Person", "B Person"], None, "a.json"));
        let json = serde_json::to_value(&forecast).unwrap();
        assert!(json["event"].is_null());
        assert!(json["reasoning"].is_null());
        assert_eq!(json["match"][1], "B Person");
    }
}
