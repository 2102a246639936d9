use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::similarity::{SimilarityScorer, titles_match};

const IDENTIFIED_DIR: &str = "identified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSection {
    #[serde(rename = "self")]
    SelfPrediction,
    ThirdParty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteOpinion {
    pub strength: Option<String>,
    pub health: Option<String>,
    pub previous_match_summary: Option<String>,
}

/// One flattened forecast, whatever shape its file used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub predictor: String,
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
    pub section: PredictionSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub file: String,
    pub message: String,
}

// The three layouts the extractor has produced over time.
enum RawShape<'a> {
    // {"predictions": {speaker: {"self_predictions": [..], "third_party_predictions": [..]}}}
    NestedBySpeaker(&'a Map<String, Value>),
    // {"predictions": [{"speaker": .., "self_predictions": [..], ..}]}
    SpeakerList(&'a [Value]),
    // {"self_predictions": {speaker: [..]}, "third_party_predictions": {speaker: [..]}}
    TopLevelBySpeaker {
        self_predictions: Option<&'a Map<String, Value>>,
        third_party: Option<&'a Map<String, Value>>,
    },
}

fn detect_shapes(root: &Map<String, Value>) -> Vec<RawShape<'_>> {
    let mut shapes = Vec::new();
    match root.get("predictions") {
        Some(Value::Object(map)) => shapes.push(RawShape::NestedBySpeaker(map)),
        Some(Value::Array(items)) => shapes.push(RawShape::SpeakerList(items)),
        _ => {}
    }
    let self_predictions = root.get("self_predictions").and_then(Value::as_object);
    let third_party = root.get("third_party_predictions").and_then(Value::as_object);
    if self_predictions.is_some() || third_party.is_some() {
        shapes.push(RawShape::TopLevelBySpeaker {
            self_predictions,
            third_party,
        });
    }
    shapes
}

/// Parsed forecasts of one file plus the entry-level problems found in it.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<PredictionRecord>,
    pub warnings: Vec<LoadWarning>,
}

struct Flattener<'f> {
    file: &'f str,
    out: ParsedFile,
}

impl<'f> Flattener<'f> {
    fn warn(&mut self, message: String) {
        warn!(file = self.file, "{message}");
        self.out.warnings.push(LoadWarning {
            file: self.file.to_string(),
            message,
        });
    }

    fn shape(&mut self, shape: RawShape<'_>) {
        match shape {
            RawShape::NestedBySpeaker(speakers) => {
                for (speaker, block) in speakers {
                    let Some(block) = block.as_object() else {
                        self.warn(format!("speaker block for {speaker} is not an object"));
                        continue;
                    };
                    self.speaker_block(speaker, block);
                }
            }
            RawShape::SpeakerList(items) => {
                for (idx, item) in items.iter().enumerate() {
                    let Some(block) = item.as_object() else {
                        self.warn(format!("predictions[{idx}] is not an object"));
                        continue;
                    };
                    let Some(speaker) = clean_text(block.get("speaker")) else {
                        self.warn(format!("predictions[{idx}] has no speaker"));
                        continue;
                    };
                    self.speaker_block(&speaker, block);
                }
            }
            RawShape::TopLevelBySpeaker {
                self_predictions,
                third_party,
            } => {
                for (section, map) in [
                    (PredictionSection::SelfPrediction, self_predictions),
                    (PredictionSection::ThirdParty, third_party),
                ] {
                    for (speaker, entries) in map.into_iter().flatten() {
                        self.entries(speaker, section, entries);
                    }
                }
            }
        }
    }

    fn speaker_block(&mut self, speaker: &str, block: &Map<String, Value>) {
        if let Some(entries) = block.get("self_predictions") {
            self.entries(speaker, PredictionSection::SelfPrediction, entries);
        }
        if let Some(entries) = block.get("third_party_predictions") {
            self.entries(speaker, PredictionSection::ThirdParty, entries);
        }
    }

    fn entries(&mut self, speaker: &str, section: PredictionSection, entries: &Value) {
        let items = match entries {
            Value::Array(items) => items.as_slice(),
            Value::Null => return,
            _ => {
                self.warn(format!("forecast list for {speaker} is not an array"));
                return;
            }
        };
        let Some(predictor) = clean_text(Some(&Value::String(speaker.to_string()))) else {
            self.warn("forecast list under a blank speaker".to_string());
            return;
        };
        for (idx, item) in items.iter().enumerate() {
            let Some(entry) = item.as_object() else {
                self.warn(format!("forecast {idx} of {predictor} is not an object"));
                continue;
            };
            let record = build_record(&predictor, section, entry, self.file);
            self.out.records.push(record);
        }
    }
}

fn build_record(
    predictor: &str,
    section: PredictionSection,
    entry: &Map<String, Value>,
    file: &str,
) -> PredictionRecord {
    let text = |key: &str| clean_text(entry.get(key));
    PredictionRecord {
        predictor: predictor.to_string(),
        participants: participants(entry.get("match")),
        arm: text("arm"),
        event: text("event"),
        predicted_winner: text("predicted_winner"),
        predicted_score: text("predicted_score"),
        prediction_summary: text("prediction_summary"),
        predicted_duration: text("predicted_duration"),
        style_conflict: text("style_conflict"),
        confidence: text("confidence"),
        reasoning: text("reasoning"),
        opinion_about_athletes: opinions(entry.get("opinion_about_athletes")),
        source_file: file.to_string(),
        section,
    }
}

/// Trimmed text; blank strings and the literals "none"/"null" become `None`.
/// Numbers and booleans are stringified.
pub fn clean_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case("none") || text.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(text)
}

// `match` is normally a two-name array; older files wrote "A vs B".
fn participants(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| clean_text(Some(v))).collect(),
        Some(Value::String(s)) => split_matchup(s),
        _ => Vec::new(),
    }
}

fn split_matchup(raw: &str) -> Vec<String> {
    let lower = raw.to_lowercase();
    for sep in [" vs. ", " vs ", " v "] {
        if let Some(pos) = lower.find(sep)
            && raw.is_char_boundary(pos)
            && raw.is_char_boundary(pos + sep.len())
        {
            return [&raw[..pos], &raw[pos + sep.len()..]]
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    Vec::new()
}

fn opinions(value: Option<&Value>) -> BTreeMap<String, AthleteOpinion> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, opinion)| {
            let opinion = match opinion {
                Value::Object(fields) => AthleteOpinion {
                    strength: clean_text(fields.get("strength")),
                    health: clean_text(fields.get("health")),
                    previous_match_summary: clean_text(fields.get("previous_match_summary")),
                },
                _ => AthleteOpinion::default(),
            };
            (name.trim().to_string(), opinion)
        })
        .collect()
}

/// Flatten one forecast file. Errors only when the file is not a JSON object
/// or carries no recognizable layout.
pub fn parse_prediction_file(file: &str, raw: &str) -> Result<ParsedFile> {
    let value: Value = serde_json::from_str(raw).context("invalid prediction json")?;
    let Some(root) = value.as_object() else {
        return Err(anyhow!("prediction file is not a json object"));
    };
    let shapes = detect_shapes(root);
    if shapes.is_empty() {
        return Err(anyhow!("no recognizable prediction layout"));
    }
    let mut flattener = Flattener {
        file,
        out: ParsedFile::default(),
    };
    for shape in shapes {
        flattener.shape(shape);
    }
    Ok(flattener.out)
}

/// All forecasts of a transcript corpus, in file order.
#[derive(Debug, Clone, Default)]
pub struct PredictionStore {
    records: Vec<PredictionRecord>,
    warnings: Vec<LoadWarning>,
}

impl PredictionStore {
    pub fn from_records(records: Vec<PredictionRecord>) -> Self {
        Self {
            records,
            warnings: Vec::new(),
        }
    }

    /// Parse files in parallel. A bad file becomes a warning; the rest still load.
    pub fn load(paths: &[PathBuf]) -> Self {
        let parsed: Vec<(String, Result<ParsedFile>)> = paths
            .par_iter()
            .map(|path| {
                let name = file_label(path);
                let result = fs::read_to_string(path)
                    .with_context(|| format!("read prediction file {}", path.display()))
                    .and_then(|raw| parse_prediction_file(&name, &raw));
                (name, result)
            })
            .collect();

        let mut store = Self::default();
        for (name, result) in parsed {
            match result {
                Ok(file) => {
                    store.records.extend(file.records);
                    store.warnings.extend(file.warnings);
                }
                Err(err) => {
                    warn!(file = %name, error = %format!("{err:#}"), "skipping prediction file");
                    store.warnings.push(LoadWarning {
                        file: name,
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        info!(
            files = paths.len(),
            records = store.records.len(),
            warnings = store.warnings.len(),
            "loaded predictions"
        );
        store
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Every `<root>/<event>/Identified/*.json`, sorted by event directory then file name.
pub fn transcript_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for event_dir in sorted_dirs(root)? {
        out.extend(identified_files(&event_dir)?);
    }
    Ok(out)
}

/// Files of one event. Falls back to the best fuzzily-matching event directory
/// when no directory carries the exact name.
pub fn event_transcript_files(
    root: &Path,
    event: &str,
    scorer: &dyn SimilarityScorer,
    threshold: f64,
) -> Result<Vec<PathBuf>> {
    let exact = root.join(event.trim());
    if exact.is_dir() {
        return identified_files(&exact);
    }
    let best = sorted_dirs(root)?
        .into_iter()
        .filter_map(|dir| {
            let name = dir.file_name()?.to_string_lossy().into_owned();
            titles_match(scorer, &name, event, threshold).then(|| (scorer.score(&name, event), dir))
        })
        .fold(None::<(f64, PathBuf)>, |best, (score, dir)| match best {
            Some((b, _)) if b >= score => best,
            _ => Some((score, dir)),
        });
    match best {
        Some((_, dir)) => identified_files(&dir),
        None => Ok(Vec::new()),
    }
}

fn sorted_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("read transcripts dir {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn identified_files(event_dir: &Path) -> Result<Vec<PathBuf>> {
    let Some(identified) = sorted_dirs(event_dir)?.into_iter().find(|p| {
        p.file_name()
            .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(IDENTIFIED_DIR))
    }) else {
        return Ok(Vec::new());
    };
    let mut files: Vec<PathBuf> = fs::read_dir(&identified)
        .with_context(|| format!("read {}", identified.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    Ok(files)
}
