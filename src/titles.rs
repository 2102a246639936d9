use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::events::{Arm, Event};
use crate::names::NameResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TitleOutcome {
    Defense,
    TitleChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleDefense {
    pub event_title: String,
    pub event_date: NaiveDate,
    pub arm: Arm,
    pub weight_category: String,
    pub previous_champion: String,
    pub winner: String,
    pub outcome: TitleOutcome,
}

type TitleKey = (Arm, String);

/// Title matches replayed in date order. Champions are canonical names.
pub struct TitleLedger<'a> {
    events: Vec<(NaiveDate, &'a Event)>,
    resolver: &'a NameResolver,
}

impl<'a> TitleLedger<'a> {
    pub fn new(events: &'a [Event], resolver: &'a NameResolver) -> Self {
        let mut dated = Vec::with_capacity(events.len());
        for event in events {
            match event.date() {
                Some(date) => dated.push((date, event)),
                None => warn!(event = %event.event_title, "title ledger skips undated event"),
            }
        }
        // Stable: same-day events keep corpus order.
        dated.sort_by_key(|(date, _)| *date);
        Self {
            events: dated,
            resolver,
        }
    }

    /// Whether `athlete` holds, going into `event_title`, a belt contested there.
    /// Only events dated strictly before the target event count.
    pub fn is_current_title_holder(&self, event_title: &str, athlete: &str) -> bool {
        let Some((target_date, target)) = self
            .events
            .iter()
            .find(|(_, e)| e.event_title.trim().eq_ignore_ascii_case(event_title.trim()))
        else {
            return false;
        };

        let mut holders: HashMap<TitleKey, String> = HashMap::new();
        for (date, event) in &self.events {
            if date >= target_date {
                break;
            }
            for m in event.matches.iter().filter(|m| m.is_title) {
                if let Some(winner) = self.canonical_winner(m.winner.as_str()) {
                    holders.insert(title_key(m.arm, m.weight_category.as_deref()), winner);
                }
            }
        }

        target.matches.iter().filter(|m| m.is_title).any(|m| {
            holders
                .get(&title_key(m.arm, m.weight_category.as_deref()))
                .is_some_and(|holder| self.resolver.same_identity(holder, athlete))
        })
    }

    /// Title matches in which the reigning champion took part.
    pub fn title_defenses(&self) -> Vec<TitleDefense> {
        let mut holders: HashMap<TitleKey, String> = HashMap::new();
        let mut out = Vec::new();
        for (date, event) in &self.events {
            for m in event.matches.iter().filter(|m| m.is_title) {
                let key = title_key(m.arm, m.weight_category.as_deref());
                let Some(winner) = self.canonical_winner(m.winner.as_str()) else {
                    continue;
                };
                if let Some(previous) = holders.get(&key) {
                    let present = m
                        .participants
                        .iter()
                        .any(|p| self.resolver.canonical_or_raw(p) == *previous);
                    if present {
                        out.push(TitleDefense {
                            event_title: event.event_title.clone(),
                            event_date: *date,
                            arm: m.arm,
                            weight_category: key.1.clone(),
                            previous_champion: previous.clone(),
                            winner: winner.clone(),
                            outcome: if winner == *previous {
                                TitleOutcome::Defense
                            } else {
                                TitleOutcome::TitleChange
                            },
                        });
                    }
                }
                holders.insert(key, winner);
            }
        }
        out
    }

    fn canonical_winner(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| self.resolver.canonical_or_raw(trimmed))
    }
}

fn title_key(arm: Arm, weight_category: Option<&str>) -> TitleKey {
    let weight = weight_category
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    (arm, weight)
}
