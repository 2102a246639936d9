use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::similarity::{SimilarityScorer, default_scorer, normalize_name, tokens};

pub const NAME_THRESHOLD: f64 = 85.0;
pub const PARTIAL_NAME_THRESHOLD: f64 = 75.0;

/// Representative spelling for a cluster of raw name variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalName {
    pub name: String,
    /// Raw spellings resolved to this entry, in first-seen order.
    pub members: Vec<String>,
}

/// Append-only registry of canonical names.
///
/// Decisions depend on insertion order: a raw name is compared against the
/// canonical names registered before it, and nothing is re-clustered later.
/// Build it in one sequential pass, then share it read-only.
#[derive(Clone)]
pub struct NameResolver {
    scorer: Arc<dyn SimilarityScorer>,
    name_threshold: f64,
    partial_threshold: f64,
    // normalized alias -> canonical spelling
    aliases: HashMap<String, String>,
    entries: Vec<CanonicalName>,
    // normalized raw spelling -> entry index
    seen: HashMap<String, usize>,
}

impl std::fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameResolver")
            .field("name_threshold", &self.name_threshold)
            .field("partial_threshold", &self.partial_threshold)
            .field("aliases", &self.aliases.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl PartialEq for NameResolver {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.aliases == other.aliases
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(default_scorer())
    }
}

impl NameResolver {
    pub fn new(scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self {
            scorer,
            name_threshold: NAME_THRESHOLD,
            partial_threshold: PARTIAL_NAME_THRESHOLD,
            aliases: HashMap::new(),
            entries: Vec::new(),
            seen: HashMap::new(),
        }
    }

    pub fn with_thresholds(mut self, name_threshold: f64, partial_threshold: f64) -> Self {
        self.name_threshold = name_threshold;
        self.partial_threshold = partial_threshold;
        self
    }

    /// Exact literal overrides (case-insensitive), consulted before fuzzy scoring.
    pub fn with_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (alias, canonical) in aliases {
            let key = normalize_name(alias.as_ref());
            let canonical = canonical.into();
            if key.is_empty() || canonical.trim().is_empty() {
                continue;
            }
            self.aliases.insert(key, canonical.trim().to_string());
        }
        self
    }

    pub fn scorer(&self) -> &Arc<dyn SimilarityScorer> {
        &self.scorer
    }

    pub fn name_threshold(&self) -> f64 {
        self.name_threshold
    }

    pub fn entries(&self) -> &[CanonicalName] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a raw spelling, registering a new canonical entry when nothing
    /// scores above threshold. Blank input is returned trimmed and never registered.
    pub fn resolve(&mut self, raw: &str) -> String {
        let trimmed = raw.trim();
        let key = normalize_name(trimmed);
        if key.is_empty() {
            return trimmed.to_string();
        }
        if let Some(idx) = self.seen.get(&key) {
            return self.entries[*idx].name.clone();
        }

        let idx = match self.aliases.get(&key).cloned() {
            Some(target) => self.alias_target_index(&target),
            None => match self.best_match(trimmed) {
                Some((idx, score)) => {
                    debug!(raw = trimmed, canonical = %self.entries[idx].name, score, "name resolved");
                    idx
                }
                None => self.register(trimmed),
            },
        };

        let entry = &mut self.entries[idx];
        if !entry.members.iter().any(|m| m == trimmed) {
            entry.members.push(trimmed.to_string());
        }
        self.seen.insert(key, idx);
        entry.name.clone()
    }

    /// Non-mutating lookup against the frozen registry.
    pub fn find(&self, raw: &str) -> Option<&str> {
        let trimmed = raw.trim();
        let key = normalize_name(trimmed);
        if key.is_empty() {
            return None;
        }
        if let Some(idx) = self.seen.get(&key) {
            return Some(self.entries[*idx].name.as_str());
        }
        if let Some(target) = self.aliases.get(&key) {
            let target_key = normalize_name(target);
            let idx = self
                .seen
                .get(&target_key)
                .copied()
                .or_else(|| self.best_match(target).map(|(idx, _)| idx));
            return match idx {
                Some(idx) => Some(self.entries[idx].name.as_str()),
                None => Some(target.as_str()),
            };
        }
        self.best_match(trimmed)
            .map(|(idx, _)| self.entries[idx].name.as_str())
    }

    /// Canonical spelling when known, otherwise the trimmed input.
    pub fn canonical_or_raw(&self, raw: &str) -> String {
        self.find(raw)
            .map(|s| s.to_string())
            .unwrap_or_else(|| raw.trim().to_string())
    }

    /// Two spellings denote the same person: they resolve to the same canonical
    /// entry, or they score at or above the identity threshold directly.
    pub fn same_identity(&self, a: &str, b: &str) -> bool {
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if normalize_name(a) == normalize_name(b) {
            return true;
        }
        if let (Some(ca), Some(cb)) = (self.find(a), self.find(b))
            && ca == cb
        {
            return true;
        }
        self.scorer.score(a, b) >= self.name_threshold
    }

    fn alias_target_index(&mut self, target: &str) -> usize {
        let target_key = normalize_name(target);
        if let Some(idx) = self.seen.get(&target_key) {
            return *idx;
        }
        if let Some(idx) = self.entries.iter().position(|e| e.name == target) {
            return idx;
        }
        // The target may already be registered under another spelling.
        let idx = match self.best_match(target) {
            Some((idx, score)) => {
                debug!(alias_target = target, canonical = %self.entries[idx].name, score, "alias target resolved");
                idx
            }
            None => self.register(target),
        };
        if !self.entries[idx].members.iter().any(|m| m == target) {
            self.entries[idx].members.push(target.to_string());
        }
        self.seen.insert(target_key, idx);
        idx
    }

    fn register(&mut self, name: &str) -> usize {
        self.entries.push(CanonicalName {
            name: name.to_string(),
            members: Vec::new(),
        });
        self.entries.len() - 1
    }

    // Highest effective score wins; ties go to the earlier entry.
    fn best_match(&self, raw: &str) -> Option<(usize, f64)> {
        let raw_tokens = tokens(raw);
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(score) = self.effective_score(raw, &raw_tokens, &entry.name) else {
                continue;
            };
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((idx, score));
            }
        }
        best
    }

    fn effective_score(&self, raw: &str, raw_tokens: &[String], candidate: &str) -> Option<f64> {
        let full = self.scorer.score(raw, candidate);
        if full >= self.name_threshold {
            return Some(full);
        }
        let candidate_tokens = tokens(candidate);
        let (single, multi) = match (raw_tokens.len(), candidate_tokens.len()) {
            (1, n) if n > 1 => (&raw_tokens[0], candidate_tokens.as_slice()),
            (n, 1) if n > 1 => (&candidate_tokens[0], raw_tokens),
            _ => return None,
        };
        let partial = multi
            .iter()
            .map(|t| self.scorer.score(single, t))
            .fold(0.0_f64, f64::max);
        (partial >= self.partial_threshold).then_some(partial)
    }
}

/// Alias table file: `{ "alias spelling": "Canonical Name" }`.
pub fn load_aliases(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read alias table {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse alias table {}", path.display()))
}
