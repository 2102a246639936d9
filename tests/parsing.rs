use std::fs;
use std::path::PathBuf;

use arm_analytics::events::{Arm, parse_events_json};
use arm_analytics::history::MatchHistoryIndex;
use arm_analytics::names::{NameResolver, load_aliases};
use arm_analytics::predictions::{PredictionSection, PredictionStore, event_transcript_files, transcript_files};
use arm_analytics::reliability::{ReliabilityRegistry, ReliabilityTier, TierBounds};
use arm_analytics::similarity::TokenSortRatio;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn parses_events_fixture() {
    let events = parse_events_json(&read_fixture("events.json"), "events.json").expect("fixture should parse");
    assert_eq!(events.len(), 7);
    assert_eq!(events[1].event_title, "East vs West 2");
    assert_eq!(events[1].date().map(|d| d.to_string()).as_deref(), Some("2022-03-10"));
    assert_eq!(events[1].matches[1].arm, Arm::Left);
    assert!(events[3].matches[0].is_title);
    assert_eq!(events[6].date(), None);
    assert_eq!(events[6].event_location, None);
}

#[test]
fn discovers_identified_transcripts_only() {
    let files = transcript_files(&fixture_path("transcripts")).expect("fixture dir should be readable");
    assert_eq!(
        file_names(&files),
        vec!["f_next.json", "a_nested.json", "b_list.json", "c_top.json", "d_broken.json", "e_unknown.json"]
    );
}

#[test]
fn event_files_fall_back_to_fuzzy_directory_match() {
    let root = fixture_path("transcripts");
    let scorer = TokenSortRatio;
    let exact = event_transcript_files(&root, "East vs West 5", &scorer, 85.0).unwrap();
    assert_eq!(exact.len(), 5);
    let fuzzy = event_transcript_files(&root, "east vs. west 15", &scorer, 85.0).unwrap();
    assert_eq!(file_names(&fuzzy), vec!["f_next.json"]);
    let missing = event_transcript_files(&root, "East vs West 25", &scorer, 85.0).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn loads_every_shape_and_isolates_bad_files() {
    let files = transcript_files(&fixture_path("transcripts")).unwrap();
    let store = PredictionStore::load(&files);
    assert_eq!(store.len(), 10);

    let warned: Vec<&str> = store.warnings().iter().map(|w| w.file.as_str()).collect();
    assert_eq!(warned.len(), 4);
    assert!(warned.contains(&"d_broken.json"));
    assert!(warned.contains(&"e_unknown.json"));
    assert!(warned.contains(&"b_list.json"));
    assert!(warned.contains(&"c_top.json"));

    let records = store.records();
    assert_eq!(records[0].source_file, "f_next.json");
    let devon_self = records
        .iter()
        .find(|r| r.section == PredictionSection::SelfPrediction)
        .expect("nested self forecast");
    assert_eq!(devon_self.predictor, "Devon Larratt");
    assert_eq!(devon_self.style_conflict.as_deref(), Some("toproll vs hook"));

    let paul = records.iter().find(|r| r.predictor == "Paul Linn").unwrap();
    assert_eq!(paul.confidence.as_deref(), Some("6"));
    assert_eq!(paul.prediction_summary, None);

    let john = records.iter().find(|r| r.predictor == "John Brzenk").unwrap();
    assert_eq!(john.predicted_winner, None);
    let michael = records.iter().find(|r| r.predictor == "Michael Todd").unwrap();
    assert_eq!(michael.prediction_summary, None);
    assert_eq!(michael.predicted_duration.as_deref(), Some("long"));
}

#[test]
fn parses_registry_fixture() {
    let registry = ReliabilityRegistry::load(&fixture_path("predictor_summary.json"), TierBounds::default()).unwrap();
    assert_eq!(registry.len(), 5);
    assert_eq!(registry.tier_of("Engin Terzi"), ReliabilityTier::High);
    assert_eq!(registry.tier_of("paul linn"), ReliabilityTier::Low);
    assert_eq!(registry.tier_of("Michael Todd"), ReliabilityTier::Unranked);
}

#[test]
fn registry_round_trips_through_save() {
    let registry = ReliabilityRegistry::load(&fixture_path("predictor_summary.json"), TierBounds::default()).unwrap();
    let dir = std::env::temp_dir().join(format!("arm_analytics_registry_{}", std::process::id()));
    let path = dir.join("predictor_summary.json");
    registry.save(&path).unwrap();
    let reloaded = ReliabilityRegistry::load(&path, TierBounds::default()).unwrap();
    assert_eq!(reloaded.entries(), registry.entries());
    assert!(!path.with_extension("json.tmp").exists());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn alias_table_fixture_feeds_the_resolver() {
    let aliases = load_aliases(&fixture_path("aliases.json")).unwrap();
    let mut resolver = NameResolver::default().with_aliases(aliases);
    resolver.resolve("Devon Larratt");
    assert_eq!(resolver.resolve("no limit"), "Devon Larratt");
    assert_eq!(resolver.resolve("Levan"), "Levan Saginashvili");
    assert_eq!(resolver.len(), 2);
}

#[test]
fn alias_target_spelled_differently_keeps_one_history() {
    let raw = r#"[
        {"event_title": "East vs West 1", "event_date": "2022-01-10", "matches": [
            {"participants": ["Devon Laratt", "Ermes Gasparini"], "winner": "Devon Laratt", "score": "3-1", "arm": "Right"}
        ]},
        {"event_title": "East vs West 2", "event_date": "2022-03-10", "matches": [
            {"participants": ["No Limit", "Paul Linn"], "winner": "No Limit", "score": "3-0", "arm": "Right"},
            {"participants": ["Devon Larratt", "Alex Kurdecha"], "winner": "Alex Kurdecha", "score": "2-3", "arm": "Left"}
        ]}
    ]"#;
    let events = parse_events_json(raw, "inline").unwrap();
    let aliases = load_aliases(&fixture_path("aliases.json")).unwrap();
    let index = MatchHistoryIndex::build(&events, NameResolver::default().with_aliases(aliases));

    assert_eq!(index.records("Devon Laratt").len(), 3);
    assert!(index.records("Devon Larratt").is_empty());
    assert_eq!(index.canonical("No Limit"), "Devon Laratt");
    assert_eq!(index.resolver().len(), 4);
}
