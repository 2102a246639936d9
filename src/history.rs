use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::events::{Arm, Event};
use crate::names::NameResolver;

/// One athlete's side of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AthleteMatchRecord {
    pub opponent: String,
    pub event: String,
    /// Position of the event in the build input.
    pub event_index: usize,
    pub raw_date: String,
    pub date: Option<NaiveDate>,
    pub arm: Arm,
    pub won: bool,
    pub score: String,
}

impl AthleteMatchRecord {
    /// Strictly before the cutoff; records without a parsed date never qualify.
    pub fn visible_at(&self, as_of: NaiveDate) -> bool {
        self.date.is_some_and(|d| d < as_of)
    }
}

/// Per-athlete match lists keyed by canonical name.
///
/// Built once from the event corpus. The order of `events` passed to
/// [`MatchHistoryIndex::build`] is the insertion order of the name registry,
/// so the same corpus in the same order always yields the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHistoryIndex {
    resolver: NameResolver,
    records: HashMap<String, Vec<AthleteMatchRecord>>,
    skipped_matches: usize,
}

impl MatchHistoryIndex {
    pub fn build(events: &[Event], mut resolver: NameResolver) -> Self {
        let mut records: HashMap<String, Vec<AthleteMatchRecord>> = HashMap::new();
        let mut skipped_matches = 0usize;

        for (event_index, event) in events.iter().enumerate() {
            let date = event.date();
            if date.is_none() {
                warn!(
                    event = %event.event_title,
                    raw_date = %event.event_date,
                    "unparseable event date; its matches stay invisible to as-of queries"
                );
            }

            for (match_index, m) in event.matches.iter().enumerate() {
                let [p1, p2] = m.participants.as_slice() else {
                    warn!(event = %event.event_title, match_index, "match without exactly two participants");
                    skipped_matches += 1;
                    continue;
                };
                if p1.trim().is_empty() || p2.trim().is_empty() {
                    warn!(event = %event.event_title, match_index, "match with a blank participant");
                    skipped_matches += 1;
                    continue;
                }

                let a = resolver.resolve(p1);
                let b = resolver.resolve(p2);
                if a == b {
                    warn!(event = %event.event_title, athlete = %a, "both participants resolve to one athlete");
                    skipped_matches += 1;
                    continue;
                }

                let Some(a_won) = winner_side(&resolver, m.winner.as_str(), p1, p2, &a, &b) else {
                    warn!(
                        event = %event.event_title,
                        winner = %m.winner,
                        "winner is not one of the participants"
                    );
                    skipped_matches += 1;
                    continue;
                };

                let base = AthleteMatchRecord {
                    opponent: String::new(),
                    event: event.event_title.clone(),
                    event_index,
                    raw_date: event.event_date.clone(),
                    date,
                    arm: m.arm,
                    won: false,
                    score: m.score.trim().to_string(),
                };
                records.entry(a.clone()).or_default().push(AthleteMatchRecord {
                    opponent: b.clone(),
                    won: a_won,
                    ..base.clone()
                });
                records.entry(b).or_default().push(AthleteMatchRecord {
                    opponent: a,
                    won: !a_won,
                    ..base
                });
            }
        }

        debug!(
            athletes = records.len(),
            canonical_names = resolver.len(),
            skipped_matches,
            "match history built"
        );
        Self {
            resolver,
            records,
            skipped_matches,
        }
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn skipped_matches(&self) -> usize {
        self.skipped_matches
    }

    /// Canonical name for a query spelling against the frozen registry.
    pub fn canonical(&self, raw: &str) -> String {
        self.resolver.canonical_or_raw(raw)
    }

    /// All records of a canonical athlete in arrival order.
    pub fn records(&self, athlete: &str) -> &[AthleteMatchRecord] {
        self.records.get(athlete).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn visible_records(
        &self,
        athlete: &str,
        as_of: NaiveDate,
    ) -> impl Iterator<Item = &AthleteMatchRecord> {
        self.records(athlete).iter().filter(move |r| r.visible_at(as_of))
    }

    /// Records sorted by date; undated records go last, arrival order breaks ties.
    pub fn chronological(&self, athlete: &str) -> Vec<&AthleteMatchRecord> {
        let mut out: Vec<&AthleteMatchRecord> = self.records(athlete).iter().collect();
        out.sort_by_key(|r| (r.date.is_none(), r.date));
        out
    }

    pub fn athletes(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

// Returns whether the first participant won.
fn winner_side(
    resolver: &NameResolver,
    winner: &str,
    raw_a: &str,
    raw_b: &str,
    a: &str,
    b: &str,
) -> Option<bool> {
    let winner = winner.trim();
    if winner.is_empty() {
        return None;
    }
    if winner.eq_ignore_ascii_case(raw_a.trim()) {
        return Some(true);
    }
    if winner.eq_ignore_ascii_case(raw_b.trim()) {
        return Some(false);
    }
    match resolver.find(winner) {
        Some(w) if w == a => Some(true),
        Some(w) if w == b => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Match;

    fn bout(winner: &str, loser: &str) -> Match {
        Match {
            participants: vec![winner.to_string(), loser.to_string()],
            winner: winner.to_string(),
            loser: Some(loser.to_string()),
            score: "3-1".to_string(),
            arm: Arm::Right,
            weight_category: None,
            is_title: false,
        }
    }

    fn event(title: &str, date: &str, matches: Vec<Match>) -> Event {
        Event {
            event_title: title.to_string(),
            event_date: date.to_string(),
            event_location: None,
            matches,
        }
    }

    #[test]
    fn each_match_produces_mirrored_records() {
        let events = vec![event("EvW 1", "2022-01-10", vec![bout("Devon Larratt", "Levan Saginashvili")])];
        let idx = MatchHistoryIndex::build(&events, NameResolver::default());
        let a = idx.records("Devon Larratt");
        let b = idx.records("Levan Saginashvili");
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].opponent, "Levan Saginashvili");
        assert_eq!(b[0].opponent, "Devon Larratt");
        assert!(a[0].won ^ b[0].won);
        assert!(a[0].won);
    }

    #[test]
    fn misspelled_participants_share_history() {
        let events = vec![
            event("EvW 1", "2022-01-10", vec![bout("Devon Larratt", "Ermes Gasparini")]),
            event("EvW 2", "2022-05-10", vec![bout("Ermes Gasparinni", "Devon Laratt")]),
        ];
        let idx = MatchHistoryIndex::build(&events, NameResolver::default());
        assert_eq!(idx.records("Devon Larratt").len(), 2);
        assert_eq!(idx.records("Ermes Gasparini").len(), 2);
        assert_eq!(idx.athletes().count(), 2);
    }

    #[test]
    fn invalid_matches_are_skipped() {
        let mut bad_winner = bout("Devon Larratt", "Ermes Gasparini");
        bad_winner.winner = "Somebody Else".to_string();
        let mut three = bout("A Person", "B Person");
        three.participants.push("C Person".to_string());
        let events = vec![event("EvW 1", "2022-01-10", vec![bad_winner, three])];
        let idx = MatchHistoryIndex::build(&events, NameResolver::default());
        assert_eq!(idx.skipped_matches(), 2);
        assert!(idx.records("Devon Larratt").is_empty());
    }

    #[test]
    fn undated_records_are_never_visible() {
        let events = vec![event("Mystery", "sometime", vec![bout("Devon Larratt", "Ermes Gasparini")])];
        let idx = MatchHistoryIndex::build(&events, NameResolver::default());
        assert_eq!(idx.records("Devon Larratt").len(), 1);
        let far_future = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap();
        assert_eq!(idx.visible_records("Devon Larratt", far_future).count(), 0);
    }

    #[test]
    fn chronological_sorts_out_of_order_input() {
        let events = vec![
            event("Late", "2023-01-01", vec![bout("Devon Larratt", "Ermes Gasparini")]),
            event("Early", "2021-01-01", vec![bout("Ermes Gasparini", "Devon Larratt")]),
        ];
        let idx = MatchHistoryIndex::build(&events, NameResolver::default());
        let ordered = idx.chronological("Devon Larratt");
        assert_eq!(ordered[0].event, "Early");
        assert_eq!(ordered[1].event, "Late");
    }
}
