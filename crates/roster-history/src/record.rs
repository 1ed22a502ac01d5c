//! Canonical player history record.
//!
//! Storage shapes (see [`crate::shape`]) normalize into this form before any
//! lifecycle operation or merge runs. Collections are kept in canonical order
//! so that two records describing the same history compare equal.

use crate::tag::PlayerTag;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Membership status of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Departed,
    Applicant,
    Rejected,
}

/// Kind of lifecycle movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Joined,
    Departed,
    Returned,
}

impl MovementKind {
    /// Status a player is in right after this movement.
    pub fn resulting_status(self) -> MemberStatus {
        match self {
            MovementKind::Joined | MovementKind::Returned => MemberStatus::Active,
            MovementKind::Departed => MemberStatus::Departed,
        }
    }
}

/// One entry in the append-only movement log.
///
/// Field order matters: the derived `Ord` sorts chronologically first, then
/// by the remaining fields so that ties have a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Movement {
    pub date: DateTime<Utc>,
    pub kind: MovementKind,
    pub reason: Option<String>,
    pub tenure_at_departure: Option<u32>,
    pub notes: Option<String>,
}

impl Movement {
    pub fn new(kind: MovementKind, date: DateTime<Utc>) -> Self {
        Self {
            date,
            kind,
            reason: None,
            tenure_at_departure: None,
            notes: None,
        }
    }
}

/// A display name the player has used before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Alias {
    pub fn new(name: impl Into<String>, seen: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            first_seen: seen,
            last_seen: seen,
        }
    }

    /// Case-insensitive identity of the alias.
    pub fn key(&self) -> String {
        alias_key(&self.name)
    }

    /// Fold another sighting of the same alias into this one.
    ///
    /// Keeps the earliest `first_seen`, the latest `last_seen`, and the
    /// spelling of whichever sighting was seen most recently.
    fn absorb(&mut self, other: Alias) {
        let other_preferred =
            (other.last_seen, Reverse(&other.name)) > (self.last_seen, Reverse(&self.name));
        if other_preferred {
            self.name = other.name;
        }
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }
}

/// Normalize a display name into its alias key.
pub fn alias_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Free-text annotation, optionally carrying structured fields for audits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Note {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

impl Note {
    pub fn new(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(label.into(), value.into());
        self
    }
}

/// The present membership period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stint {
    pub start_date: DateTime<Utc>,
    pub is_active: bool,
}

impl Stint {
    pub fn open(start_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            is_active: true,
        }
    }
}

/// Full membership history of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerHistoryRecord {
    pub tag: PlayerTag,
    pub primary_name: String,
    pub aliases: Vec<Alias>,
    pub movements: Vec<Movement>,
    /// Cumulative days of membership across all stints.
    pub total_tenure: u32,
    pub current_stint: Option<Stint>,
    pub notes: Vec<Note>,
    pub status: MemberStatus,
    pub last_updated: DateTime<Utc>,
}

impl PlayerHistoryRecord {
    /// Record for a player first observed as a member.
    pub fn joined(tag: PlayerTag, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            tag,
            primary_name: name.into(),
            aliases: Vec::new(),
            movements: vec![Movement::new(MovementKind::Joined, at)],
            total_tenure: 0,
            current_stint: Some(Stint::open(at)),
            notes: Vec::new(),
            status: MemberStatus::Active,
            last_updated: at,
        }
    }

    /// Record for a player first observed as an applicant.
    pub fn applicant(tag: PlayerTag, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            tag,
            primary_name: name.into(),
            aliases: Vec::new(),
            movements: Vec::new(),
            total_tenure: 0,
            current_stint: None,
            notes: Vec::new(),
            status: MemberStatus::Applicant,
            last_updated: at,
        }
    }

    /// Most recent movement, by date.
    pub fn latest_movement(&self) -> Option<&Movement> {
        self.movements.iter().max()
    }

    /// Status implied by the movement log, if it has any entries.
    pub fn derived_status(&self) -> Option<MemberStatus> {
        self.latest_movement().map(|m| m.kind.resulting_status())
    }

    /// Whole days the current stint has been running, zero when inactive.
    pub fn current_stint_days(&self, now: DateTime<Utc>) -> u32 {
        match self.current_stint {
            Some(stint) if stint.is_active => {
                let days = (now - stint.start_date).num_days();
                u32::try_from(days.max(0)).unwrap_or(u32::MAX)
            }
            _ => 0,
        }
    }

    /// Put every collection into canonical order, collapsing duplicates.
    pub fn canonicalize(&mut self) {
        self.movements = canonical_movements(std::mem::take(&mut self.movements));
        self.aliases = canonical_aliases(std::mem::take(&mut self.aliases));
        self.notes = canonical_notes(std::mem::take(&mut self.notes));
    }

    /// Copy of the record in canonical order.
    pub fn canonical(mut self) -> Self {
        self.canonicalize();
        self
    }
}

/// Sort chronologically and drop exact duplicates.
pub(crate) fn canonical_movements(mut movements: Vec<Movement>) -> Vec<Movement> {
    movements.sort();
    movements.dedup();
    movements
}

/// Collapse aliases sharing a case-insensitive key, ordered by first sighting.
pub(crate) fn canonical_aliases(aliases: Vec<Alias>) -> Vec<Alias> {
    let mut by_key: BTreeMap<String, Alias> = BTreeMap::new();
    for alias in aliases {
        let key = alias.key();
        if key.is_empty() {
            continue;
        }
        match by_key.get_mut(&key) {
            Some(existing) => existing.absorb(alias),
            None => {
                by_key.insert(key, alias);
            }
        }
    }

    let mut collapsed: Vec<Alias> = by_key.into_values().collect();
    collapsed.sort_by(|a, b| {
        a.first_seen
            .cmp(&b.first_seen)
            .then_with(|| a.key().cmp(&b.key()))
    });
    collapsed
}

/// Collapse notes sharing `(timestamp, text)`; the greatest entry survives.
pub(crate) fn canonical_notes(mut notes: Vec<Note>) -> Vec<Note> {
    notes.sort_by(|a, b| b.cmp(a));
    notes.dedup_by(|later, kept| later.timestamp == kept.timestamp && later.text == kept.text);
    notes.reverse();
    notes
}
