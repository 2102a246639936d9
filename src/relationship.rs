use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::events::{Arm, Event};
use crate::history::MatchHistoryIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdvantageCounts {
    pub positive: u32,
    pub negative: u32,
    pub net: i64,
}

impl AdvantageCounts {
    fn record(&mut self, first_side_won: bool) {
        if first_side_won {
            self.positive += 1;
        } else {
            self.negative += 1;
        }
        self.net = i64::from(self.positive) - i64::from(self.negative);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadToHeadEntry {
    pub athlete: String,
    pub opponent: String,
    pub event: String,
    pub date: String,
    pub arm: Arm,
    pub won: bool,
    pub score: String,
}

/// A shared opponent that exactly one of the two athletes has beaten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedOpponentResult {
    pub opponent: String,
    pub a_win_score: Option<String>,
    pub b_win_score: Option<String>,
}

/// A second-order comparison: `a_opponent` and `b_opponent` both faced
/// `shared_opponent`, and exactly one of them beat it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondOrderLink {
    pub a_opponent: String,
    pub b_opponent: String,
    pub shared_opponent: String,
    pub a_opponent_win_score: Option<String>,
    pub b_opponent_win_score: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipReport {
    pub athlete_a: String,
    pub athlete_b: String,
    pub as_of: NaiveDate,
    pub head_to_head: Vec<HeadToHeadEntry>,
    /// +1 when A won the latest meeting, -1 when A lost it, 0 without meetings.
    pub head_to_head_result: i8,
    pub shared_opponents: Vec<SharedOpponentResult>,
    pub first_order: AdvantageCounts,
    pub second_order_links: Vec<SecondOrderLink>,
    pub second_order: AdvantageCounts,
    pub net_score: i64,
}

impl RelationshipReport {
    pub fn empty(athlete_a: &str, athlete_b: &str, as_of: NaiveDate) -> Self {
        Self {
            athlete_a: athlete_a.to_string(),
            athlete_b: athlete_b.to_string(),
            as_of,
            head_to_head: Vec::new(),
            head_to_head_result: 0,
            shared_opponents: Vec::new(),
            first_order: AdvantageCounts::default(),
            second_order_links: Vec::new(),
            second_order: AdvantageCounts::default(),
            net_score: 0,
        }
    }

    pub fn has_head_to_head(&self) -> bool {
        !self.head_to_head.is_empty()
    }

    /// Carries at least one usable signal for the feature builder.
    pub fn is_valuable(&self) -> bool {
        self.has_head_to_head() || self.first_order.net != 0 || !self.second_order_links.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpponentOutcome {
    won: bool,
    // Score of the first visible win, in arrival order.
    win_score: Option<String>,
}

type OpponentView = BTreeMap<String, OpponentOutcome>;

/// Memoized per-athlete opponent views for one as-of date.
///
/// The second-order walk asks for the same opponents' views many times;
/// batch jobs should keep one cache per date and reuse it across pairs.
#[derive(Debug, Default)]
pub struct ViewCache {
    as_of: Option<NaiveDate>,
    views: HashMap<String, Arc<OpponentView>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    fn view(&mut self, index: &MatchHistoryIndex, athlete: &str, as_of: NaiveDate) -> Arc<OpponentView> {
        if self.as_of != Some(as_of) {
            self.views.clear();
            self.as_of = Some(as_of);
        }
        if let Some(view) = self.views.get(athlete) {
            return Arc::clone(view);
        }
        let mut view = OpponentView::new();
        for record in index.visible_records(athlete, as_of) {
            let entry = view
                .entry(record.opponent.clone())
                .or_insert(OpponentOutcome {
                    won: false,
                    win_score: None,
                });
            if record.won && !entry.won {
                entry.won = true;
                entry.win_score = Some(record.score.clone());
            }
        }
        let view = Arc::new(view);
        self.views.insert(athlete.to_string(), Arc::clone(&view));
        view
    }
}

pub struct RelationshipAnalyzer<'a> {
    index: &'a MatchHistoryIndex,
}

impl<'a> RelationshipAnalyzer<'a> {
    pub fn new(index: &'a MatchHistoryIndex) -> Self {
        Self { index }
    }

    pub fn analyze(&self, athlete_a: &str, athlete_b: &str, as_of: NaiveDate) -> RelationshipReport {
        self.analyze_with_cache(athlete_a, athlete_b, as_of, &mut ViewCache::new())
    }

    pub fn analyze_with_cache(
        &self,
        athlete_a: &str,
        athlete_b: &str,
        as_of: NaiveDate,
        cache: &mut ViewCache,
    ) -> RelationshipReport {
        let a = self.index.canonical(athlete_a);
        let b = self.index.canonical(athlete_b);
        let mut report = RelationshipReport::empty(&a, &b, as_of);

        self.head_to_head(&a, &b, as_of, &mut report);

        let view_a = cache.view(self.index, &a, as_of);
        let view_b = cache.view(self.index, &b, as_of);

        for (opponent, a_out) in view_a.iter() {
            if *opponent == a || *opponent == b {
                continue;
            }
            let Some(b_out) = view_b.get(opponent) else {
                continue;
            };
            if a_out.won != b_out.won {
                report.first_order.record(a_out.won);
                report.shared_opponents.push(SharedOpponentResult {
                    opponent: opponent.clone(),
                    a_win_score: a_out.win_score.clone(),
                    b_win_score: b_out.win_score.clone(),
                });
            }
        }

        let a_opponents: Vec<&String> = view_a.keys().filter(|o| **o != a && **o != b).collect();
        let b_opponents: Vec<&String> = view_b.keys().filter(|o| **o != a && **o != b).collect();
        for oa in &a_opponents {
            let view_oa = cache.view(self.index, oa, as_of);
            for ob in &b_opponents {
                // Identical views cannot produce a one-sided result.
                if oa == ob {
                    continue;
                }
                let view_ob = cache.view(self.index, ob, as_of);
                for (shared, oa_out) in view_oa.iter() {
                    if *shared == a || *shared == b || shared == *oa || shared == *ob {
                        continue;
                    }
                    let Some(ob_out) = view_ob.get(shared) else {
                        continue;
                    };
                    if oa_out.won != ob_out.won {
                        report.second_order.record(oa_out.won);
                        report.second_order_links.push(SecondOrderLink {
                            a_opponent: (*oa).clone(),
                            b_opponent: (*ob).clone(),
                            shared_opponent: shared.clone(),
                            a_opponent_win_score: oa_out.win_score.clone(),
                            b_opponent_win_score: ob_out.win_score.clone(),
                        });
                    }
                }
            }
        }

        report.net_score = i64::from(report.head_to_head_result)
            + report.first_order.net
            + report.second_order.net;
        report
    }

    fn head_to_head(&self, a: &str, b: &str, as_of: NaiveDate, report: &mut RelationshipReport) {
        let mut meetings = Vec::new();
        for (athlete, opponent) in [(a, b), (b, a)] {
            for record in self.index.visible_records(athlete, as_of) {
                if record.opponent == opponent {
                    meetings.push((record.date, record.event_index, athlete == b, record, athlete));
                }
            }
        }

        // max_by_key keeps the last of equal keys, i.e. the latest arrival.
        let latest = self
            .index
            .visible_records(a, as_of)
            .filter(|r| r.opponent == b)
            .max_by_key(|r| r.date);
        report.head_to_head_result = match latest {
            Some(r) if r.won => 1,
            Some(_) => -1,
            None => 0,
        };

        meetings.sort_by_key(|(date, event_index, is_b, _, _)| (*date, *event_index, *is_b));
        report.head_to_head = meetings
            .into_iter()
            .map(|(_, _, _, record, athlete)| HeadToHeadEntry {
                athlete: athlete.to_string(),
                opponent: record.opponent.clone(),
                event: record.event.clone(),
                date: record.raw_date.clone(),
                arm: record.arm,
                won: record.won,
                score: record.score.clone(),
            })
            .collect();
    }
}

/// One corpus match with its relationship report computed as of its own date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchComparison {
    pub event: String,
    pub date: String,
    pub arm: Arm,
    pub participants: [String; 2],
    pub score: String,
    pub analysis: RelationshipReport,
}

/// Compare the participants of every dated corpus match as of that match's
/// date. Pairs meeting twice on one date are compared once. Dates are
/// processed in parallel, each with its own view cache; output keeps corpus order.
pub fn analyze_corpus_matches(events: &[Event], index: &MatchHistoryIndex) -> Vec<MatchComparison> {
    struct Pending<'e> {
        position: usize,
        event: &'e Event,
        match_index: usize,
    }

    let mut seen = HashSet::new();
    let mut by_date: BTreeMap<NaiveDate, Vec<Pending<'_>>> = BTreeMap::new();
    let mut position = 0usize;
    for event in events {
        let Some(date) = event.date() else {
            continue;
        };
        for (match_index, m) in event.matches.iter().enumerate() {
            let [p1, p2] = m.participants.as_slice() else {
                continue;
            };
            let mut pair = [index.canonical(p1), index.canonical(p2)];
            pair.sort();
            if !seen.insert((pair, date)) {
                continue;
            }
            by_date.entry(date).or_default().push(Pending {
                position,
                event,
                match_index,
            });
            position += 1;
        }
    }

    let groups: Vec<(NaiveDate, Vec<Pending<'_>>)> = by_date.into_iter().collect();
    let mut out: Vec<(usize, MatchComparison)> = groups
        .par_iter()
        .flat_map_iter(|(date, pending)| {
            let analyzer = RelationshipAnalyzer::new(index);
            let mut cache = ViewCache::new();
            pending
                .iter()
                .map(|p| {
                    let m = &p.event.matches[p.match_index];
                    let analysis =
                        analyzer.analyze_with_cache(&m.participants[0], &m.participants[1], *date, &mut cache);
                    (
                        p.position,
                        MatchComparison {
                            event: p.event.event_title.clone(),
                            date: p.event.event_date.clone(),
                            arm: m.arm,
                            participants: [m.participants[0].clone(), m.participants[1].clone()],
                            score: m.score.clone(),
                            analysis,
                        },
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();
    out.sort_by_key(|(position, _)| *position);
    out.into_iter().map(|(_, c)| c).collect()
}
