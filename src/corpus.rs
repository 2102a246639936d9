use anyhow::Result;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{EngineConfig, with_pool};
use crate::consensus::{ConsensusAggregator, ConsensusReport};
use crate::error::QueryError;
use crate::events::{Event, load_events_files};
use crate::history::MatchHistoryIndex;
use crate::matcher::{EVENT_THRESHOLD, PredictionMatcher};
use crate::names::{NameResolver, load_aliases};
use crate::predictions::{PredictionStore, transcript_files};
use crate::relationship::{MatchComparison, RelationshipAnalyzer, RelationshipReport, analyze_corpus_matches};
use crate::reliability::{ReliabilityRegistry, TierBounds, grade};
use crate::titles::{TitleDefense, TitleLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipQuery {
    pub athlete_a: String,
    pub athlete_b: String,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusQuery {
    pub athlete_a: String,
    pub athlete_b: String,
    pub event: String,
}

/// Everything a query needs, loaded once and shared read-only.
pub struct Corpus {
    events: Vec<Event>,
    index: MatchHistoryIndex,
    store: PredictionStore,
    registry: ReliabilityRegistry,
    event_threshold: f64,
    pool: Option<rayon::ThreadPool>,
}

impl Corpus {
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let aliases = match &config.name_aliases_file {
            Some(path) => load_aliases(path).unwrap_or_else(|err| {
                warn!(error = %format!("{err:#}"), "alias table unavailable; resolving by similarity only");
                Default::default()
            }),
            None => Default::default(),
        };
        let resolver = NameResolver::default()
            .with_thresholds(config.name_threshold, config.partial_name_threshold)
            .with_aliases(aliases);

        let events = load_events_files(config.events_files.as_slice());
        if events.is_empty() {
            warn!(files = config.events_files.len(), "no events loaded; relationship queries will be empty");
        }

        let files = match transcript_files(&config.transcripts_dir) {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "no transcript corpus; consensus queries will be empty");
                Vec::new()
            }
        };
        let store = PredictionStore::load(&files);

        let registry = if config.predictor_summary_file.is_file() {
            ReliabilityRegistry::load(&config.predictor_summary_file, config.tier_bounds)?
        } else {
            warn!(
                path = %config.predictor_summary_file.display(),
                "predictor registry missing; reliability counts will be zero"
            );
            ReliabilityRegistry::default()
        };
        let registry = registry.with_matching(resolver.scorer().clone(), config.name_threshold);

        let mut corpus = Self::from_parts(events, resolver, store, registry);
        corpus.event_threshold = config.event_threshold;
        corpus.pool = config.build_pool();
        Ok(corpus)
    }

    /// Build from in-memory inputs. `events` order is the name-resolution order.
    pub fn from_parts(
        events: Vec<Event>,
        resolver: NameResolver,
        store: PredictionStore,
        registry: ReliabilityRegistry,
    ) -> Self {
        let index = MatchHistoryIndex::build(&events, resolver);
        info!(
            events = events.len(),
            athletes = index.resolver().len(),
            forecasts = store.len(),
            predictors = registry.len(),
            "corpus ready"
        );
        Self {
            events,
            index,
            store,
            registry,
            event_threshold: EVENT_THRESHOLD,
            pool: None,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn index(&self) -> &MatchHistoryIndex {
        &self.index
    }

    pub fn store(&self) -> &PredictionStore {
        &self.store
    }

    pub fn registry(&self) -> &ReliabilityRegistry {
        &self.registry
    }

    pub fn relationship(
        &self,
        athlete_a: &str,
        athlete_b: &str,
        as_of: NaiveDate,
    ) -> Result<RelationshipReport, QueryError> {
        self.check_pair(athlete_a, athlete_b)?;
        Ok(RelationshipAnalyzer::new(&self.index).analyze(athlete_a, athlete_b, as_of))
    }

    pub fn consensus(&self, athlete_a: &str, athlete_b: &str, event: &str) -> Result<ConsensusReport, QueryError> {
        self.check_pair(athlete_a, athlete_b)?;
        if event.trim().is_empty() {
            return Err(QueryError::BlankEvent);
        }
        let resolver = self.index.resolver();
        let matched = PredictionMatcher::new(resolver)
            .with_event_threshold(self.event_threshold)
            .find(athlete_a, athlete_b, event, &self.store);
        Ok(ConsensusAggregator::new(resolver, &self.registry).aggregate_matched(matched))
    }

    /// Independent queries in parallel; results line up with `queries`.
    pub fn relationships(&self, queries: &[RelationshipQuery]) -> Vec<Result<RelationshipReport, QueryError>> {
        with_pool(&self.pool, || {
            queries
                .par_iter()
                .map(|q| self.relationship(&q.athlete_a, &q.athlete_b, q.as_of))
                .collect()
        })
    }

    pub fn consensus_many(&self, queries: &[ConsensusQuery]) -> Vec<Result<ConsensusReport, QueryError>> {
        with_pool(&self.pool, || {
            queries
                .par_iter()
                .map(|q| self.consensus(&q.athlete_a, &q.athlete_b, &q.event))
                .collect()
        })
    }

    pub fn is_current_title_holder(&self, event_title: &str, athlete: &str) -> bool {
        TitleLedger::new(&self.events, self.index.resolver()).is_current_title_holder(event_title, athlete)
    }

    pub fn title_defenses(&self) -> Vec<TitleDefense> {
        TitleLedger::new(&self.events, self.index.resolver()).title_defenses()
    }

    pub fn analyze_corpus_matches(&self) -> Vec<MatchComparison> {
        with_pool(&self.pool, || analyze_corpus_matches(&self.events, &self.index))
    }

    /// Grade every predictor in the store against the event results.
    pub fn grade_predictors(&self, bounds: TierBounds) -> ReliabilityRegistry {
        grade(&self.events, &self.store, self.index.resolver(), bounds)
    }

    fn check_pair(&self, athlete_a: &str, athlete_b: &str) -> Result<(), QueryError> {
        if athlete_a.trim().is_empty() || athlete_b.trim().is_empty() {
            return Err(QueryError::BlankAthlete);
        }
        if self.index.resolver().same_identity(athlete_a, athlete_b) {
            return Err(QueryError::SameAthlete(
                athlete_a.trim().to_string(),
                athlete_b.trim().to_string(),
            ));
        }
        Ok(())
    }
}
