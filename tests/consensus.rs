use std::collections::BTreeMap;
use std::path::PathBuf;

use arm_analytics::consensus::{ConsensusAggregator, ConsensusFavorite, TierCounts, dedup_forecasts};
use arm_analytics::matcher::Forecast;
use arm_analytics::names::NameResolver;
use arm_analytics::reliability::{ReliabilityRegistry, TierBounds};
use arm_analytics::{ConsensusQuery, Corpus, EngineConfig, QueryError};

const DEVON: &str = "Devon Larratt";
const LEVAN: &str = "Levan Saginashvili";
const EVENT: &str = "East vs West 5";

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn fixture_config() -> EngineConfig {
    EngineConfig {
        events_files: vec![fixture_path("events.json")],
        transcripts_dir: fixture_path("transcripts"),
        predictor_summary_file: fixture_path("predictor_summary.json"),
        name_aliases_file: Some(fixture_path("aliases.json")),
        ..EngineConfig::default()
    }
}

fn corpus() -> Corpus {
    Corpus::load(&fixture_config()).expect("fixture corpus should load")
}

fn forecast(predictor: &str, winner: Option<&str>, summary: Option<&str>) -> Forecast {
    Forecast {
        predictor: predictor.to_string(),
        participants: vec![DEVON.to_string(), LEVAN.to_string()],
        arm: Some("Right".to_string()),
        event: Some(EVENT.to_string()),
        predicted_winner: winner.map(str::to_string),
        predicted_score: None,
        prediction_summary: summary.map(str::to_string),
        predicted_duration: None,
        style_conflict: None,
        confidence: None,
        reasoning: None,
        opinion_about_athletes: BTreeMap::new(),
        source_file: "manual.json".to_string(),
    }
}

#[test]
fn fixture_forecasts_produce_a_full_report() {
    let report = corpus().consensus(DEVON, LEVAN, EVENT).unwrap();
    assert!(report.match_found);
    assert_eq!(report.event, EVENT);
    assert_eq!(report.files, vec!["a_nested.json", "b_list.json", "c_top.json"]);

    assert_eq!(report.self_predictions.len(), 1);
    assert_eq!(report.self_predictions[0].predictor, DEVON);
    let third: Vec<&str> = report
        .third_party_predictions
        .iter()
        .map(|f| f.predictor.as_str())
        .collect();
    assert_eq!(third, vec!["Engin Terzi", "Paul Linn", "Alex Kurdecha", "Michael Todd", "John Brzenk"]);

    assert_eq!(report.votes_a, 3);
    assert_eq!(report.votes_b, 2);
    assert_eq!(report.favorite, ConsensusFavorite::Athlete(DEVON.to_string()));
    assert!((report.confidence - 0.6).abs() < 1e-9);

    assert_eq!(report.metadata.total_predictions, 6);
    assert_eq!(report.metadata.unique_predictors, 6);
    assert!((report.metadata.data_quality_score - 0.667).abs() < 1e-9);
    assert!(report.metadata.has_detailed_summaries);
    assert!(report.metadata.has_athlete_opinions);
}

#[test]
fn longer_summary_survives_dedup() {
    let report = corpus().consensus(DEVON, LEVAN, EVENT).unwrap();
    let engin = &report.third_party_predictions[0];
    assert_eq!(
        engin.prediction_summary.as_deref(),
        Some("Devon wins late once Levan's endurance fades")
    );
    assert!(engin.opinion_about_athletes.contains_key(DEVON));
}

#[test]
fn self_forecasts_are_left_out_of_reliability_counts() {
    let report = corpus().consensus(DEVON, LEVAN, EVENT).unwrap();
    // Devon Larratt is registered as high tier but forecast his own match.
    assert_eq!(report.tier_counts_a, TierCounts { low: 1, high: 1 });
    assert_eq!(report.tier_counts_b, TierCounts { low: 0, high: 1 });
}

#[test]
fn vote_total_never_exceeds_forecasts_considered() {
    let report = corpus().consensus(LEVAN, DEVON, EVENT).unwrap();
    assert!(report.total_votes() as usize <= report.metadata.total_predictions);
    // John Brzenk's forecast names no winner.
    assert_eq!(report.total_votes() as usize, report.metadata.total_predictions - 1);
    assert_eq!(report.votes_a, 2);
    assert_eq!(report.votes_b, 3);
}

#[test]
fn numbered_events_do_not_bleed_into_each_other() {
    let report = corpus().consensus(DEVON, LEVAN, "East vs West 15").unwrap();
    assert_eq!(report.files, vec!["f_next.json", "a_nested.json"]);
    assert_eq!(report.third_party_predictions.len(), 1);
    assert_eq!(
        report.third_party_predictions[0].prediction_summary.as_deref(),
        Some("Rematch goes to Levan")
    );
    assert_eq!(report.favorite, ConsensusFavorite::Athlete(LEVAN.to_string()));
    assert_eq!(report.confidence, 1.0);
}

#[test]
fn aliases_resolve_query_names() {
    let by_alias = corpus().consensus("No Limit", LEVAN, EVENT).unwrap();
    assert_eq!(by_alias.votes_a, 3);
    assert_eq!(by_alias.self_predictions.len(), 1);
    assert_eq!(by_alias.athlete_a, DEVON);
    assert_eq!(by_alias.favorite, ConsensusFavorite::Athlete(DEVON.to_string()));
}

#[test]
fn missing_federation_and_alias_files_are_skipped() {
    let config = EngineConfig {
        events_files: vec![fixture_path("events.json"), fixture_path("missing_kott.json")],
        name_aliases_file: Some(fixture_path("missing_aliases.json")),
        ..fixture_config()
    };
    let corpus = Corpus::load(&config).expect("missing inputs degrade to empty");
    assert_eq!(corpus.events().len(), 7);
    let report = corpus.consensus(DEVON, LEVAN, EVENT).unwrap();
    assert_eq!(report.votes_a, 3);

    let config = EngineConfig {
        events_files: vec![fixture_path("missing_kott.json")],
        ..fixture_config()
    };
    let corpus = Corpus::load(&config).expect("empty event corpus still loads");
    assert!(corpus.events().is_empty());
    assert!(corpus.analyze_corpus_matches().is_empty());
}

#[test]
fn unknown_matchup_reports_no_match() {
    let report = corpus().consensus("Michael Todd", "Paul Linn", EVENT).unwrap();
    assert!(!report.match_found);
    assert!(report.files.is_empty());
    assert_eq!(report.total_votes(), 0);
    assert_eq!(report.favorite, ConsensusFavorite::NoConsensus);
    assert_eq!(report.confidence, 0.0);
    assert_eq!(report.metadata.data_quality_score, 0.0);
}

#[test]
fn invalid_consensus_queries_fail_fast() {
    let corpus = corpus();
    assert_eq!(corpus.consensus(DEVON, LEVAN, "   ").unwrap_err(), QueryError::BlankEvent);
    assert_eq!(corpus.consensus("", LEVAN, EVENT).unwrap_err(), QueryError::BlankAthlete);
    assert!(matches!(
        corpus.consensus("No Limit", DEVON, EVENT),
        Err(QueryError::SameAthlete(_, _))
    ));
}

#[test]
fn batch_consensus_keeps_query_order() {
    let corpus = corpus();
    let queries = vec![
        ConsensusQuery {
            athlete_a: DEVON.to_string(),
            athlete_b: LEVAN.to_string(),
            event: EVENT.to_string(),
        },
        ConsensusQuery {
            athlete_a: DEVON.to_string(),
            athlete_b: LEVAN.to_string(),
            event: "East vs West 15".to_string(),
        },
    ];
    let results = corpus.consensus_many(&queries);
    assert_eq!(results[0], corpus.consensus(DEVON, LEVAN, EVENT));
    assert_eq!(results[1], corpus.consensus(DEVON, LEVAN, "East vs West 15"));
}

#[test]
fn three_to_two_third_party_split_gives_sixty_percent() {
    let resolver = NameResolver::default();
    let registry = ReliabilityRegistry::default();
    let report = ConsensusAggregator::new(&resolver, &registry).aggregate(
        Vec::new(),
        vec![
            forecast("Fan One", Some(DEVON), None),
            forecast("Fan Two", Some("devon larratt"), None),
            forecast("Fan Three", Some("Devon Laratt"), None),
            forecast("Fan Four", Some(LEVAN), None),
            forecast("Fan Five", Some(LEVAN), None),
        ],
        DEVON,
        LEVAN,
    );
    assert!(report.match_found);
    assert_eq!(report.favorite, ConsensusFavorite::Athlete(DEVON.to_string()));
    assert!((report.confidence - 0.6).abs() < 1e-9);
    assert_eq!(report.metadata.self_count, 0);
}

#[test]
fn aggregating_deduplicated_input_again_changes_nothing() {
    let resolver = NameResolver::default();
    let registry = ReliabilityRegistry::from_json_str(
        r#"{"Fan One": {"total_predictions": 10, "correct_predictions": 8, "success_rate": 80.0}}"#,
        TierBounds::default(),
    )
    .unwrap();
    let aggregator = ConsensusAggregator::new(&resolver, &registry);
    let input = vec![
        forecast("Fan One", Some(DEVON), Some("short")),
        forecast("Fan One", Some(DEVON), Some("much longer summary")),
        forecast("Fan One", Some(LEVAN), None),
        forecast("Fan Two", None, None),
    ];
    let once = aggregator.aggregate(Vec::new(), input, DEVON, LEVAN);
    let twice = aggregator.aggregate(Vec::new(), once.third_party_predictions.clone(), DEVON, LEVAN);
    assert_eq!(once.third_party_predictions.len(), 3);
    assert_eq!(dedup_forecasts(once.third_party_predictions.clone()), once.third_party_predictions);
    assert_eq!((once.votes_a, once.votes_b), (twice.votes_a, twice.votes_b));
    assert_eq!(once.tier_counts_a, twice.tier_counts_a);
    assert_eq!(once.tier_counts_a, TierCounts { low: 0, high: 1 });
    assert_eq!(once.tier_counts_b, TierCounts { low: 0, high: 1 });
}
