//! Storage shapes of a player history record.
//!
//! The device cache writes camelCase JSON, the remote store snake_case rows
//! that also carry the owning clan. Either side may omit optional fields.
//! This module is the only place those field names are spelled out; everything
//! else works on [`PlayerHistoryRecord`].

use crate::record::{Alias, MemberStatus, Movement, MovementKind, Note, PlayerHistoryRecord, Stint};
use crate::tag::PlayerTag;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Local cache shape (camelCase)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalShape {
    pub tag: PlayerTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<LocalAlias>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movements: Option<Vec<LocalMovement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tenure: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stint: Option<LocalStint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<LocalNote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAlias {
    pub name: String,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMovement {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenure_at_departure: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStint {
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalNote {
    pub timestamp: DateTime<Utc>,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<BTreeMap<String, String>>,
}

// ============================================================================
// Remote store shape (snake_case)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteShape {
    pub tag: PlayerTag,
    /// Clan the row belongs to; the store keys rows by `(clan_tag, tag)`.
    #[serde(default)]
    pub clan_tag: Option<String>,
    #[serde(default)]
    pub primary_name: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<RemoteAlias>>,
    #[serde(default)]
    pub movements: Option<Vec<RemoteMovement>>,
    #[serde(default)]
    pub total_tenure: Option<u32>,
    #[serde(default)]
    pub current_stint: Option<RemoteStint>,
    #[serde(default)]
    pub notes: Option<Vec<RemoteNote>>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Assigned by the store on write.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlias {
    pub name: String,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMovement {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub tenure_at_departure: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStint {
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub timestamp: DateTime<Utc>,
    pub note: String,
    #[serde(default)]
    pub custom_fields: Option<BTreeMap<String, String>>,
}

// ============================================================================
// Element conversions
// ============================================================================

// Both shapes use the same Rust field names for their elements; only the
// serde attributes differ.
macro_rules! element_conversions {
    ($alias:ident, $movement:ident, $stint:ident, $note:ident) => {
        impl From<$alias> for Alias {
            fn from(a: $alias) -> Self {
                alias_from_parts(a.name, a.first_seen, a.last_seen)
            }
        }

        impl From<&Alias> for $alias {
            fn from(a: &Alias) -> Self {
                Self {
                    name: a.name.clone(),
                    first_seen: Some(a.first_seen),
                    last_seen: Some(a.last_seen),
                }
            }
        }

        impl From<$movement> for Movement {
            fn from(m: $movement) -> Self {
                Self {
                    date: m.date,
                    kind: m.kind,
                    reason: m.reason,
                    tenure_at_departure: m.tenure_at_departure,
                    notes: m.notes,
                }
            }
        }

        impl From<&Movement> for $movement {
            fn from(m: &Movement) -> Self {
                Self {
                    kind: m.kind,
                    date: m.date,
                    reason: m.reason.clone(),
                    tenure_at_departure: m.tenure_at_departure,
                    notes: m.notes.clone(),
                }
            }
        }

        impl From<$stint> for Stint {
            fn from(s: $stint) -> Self {
                Self {
                    start_date: s.start_date,
                    is_active: s.is_active,
                }
            }
        }

        impl From<Stint> for $stint {
            fn from(s: Stint) -> Self {
                Self {
                    start_date: s.start_date,
                    is_active: s.is_active,
                }
            }
        }

        impl From<$note> for Note {
            fn from(n: $note) -> Self {
                Self {
                    timestamp: n.timestamp,
                    text: n.note,
                    custom_fields: n.custom_fields.unwrap_or_default(),
                }
            }
        }

        impl From<&Note> for $note {
            fn from(n: &Note) -> Self {
                Self {
                    timestamp: n.timestamp,
                    note: n.text.clone(),
                    custom_fields: Some(n.custom_fields.clone()),
                }
            }
        }
    };
}

element_conversions!(LocalAlias, LocalMovement, LocalStint, LocalNote);
element_conversions!(RemoteAlias, RemoteMovement, RemoteStint, RemoteNote);

// ============================================================================
// Normalization
// ============================================================================

/// Normalize a cache entry into the canonical record. Never fails.
pub fn from_local_shape(shape: LocalShape) -> PlayerHistoryRecord {
    assemble(
        shape.tag,
        shape.primary_name,
        import(shape.aliases),
        import(shape.movements),
        shape.total_tenure,
        shape.current_stint.map(Stint::from),
        import(shape.notes),
        shape.status,
        shape.last_updated,
    )
}

/// Normalize a remote row into the canonical record. Never fails.
///
/// A row without `status` gets one inferred from its own history; use
/// [`crate::merge::merge_remote_row`] when the local copy should decide instead.
pub fn from_remote_shape(shape: RemoteShape) -> PlayerHistoryRecord {
    assemble(
        shape.tag,
        shape.primary_name,
        import(shape.aliases),
        import(shape.movements),
        shape.total_tenure,
        shape.current_stint.map(Stint::from),
        import(shape.notes),
        shape.status,
        shape.last_updated.or(shape.updated_at),
    )
}

/// Convert a record into the cache's shape.
pub fn to_local_shape(record: &PlayerHistoryRecord) -> LocalShape {
    LocalShape {
        tag: record.tag.clone(),
        primary_name: non_empty(&record.primary_name),
        aliases: Some(export(&record.aliases)),
        movements: Some(export(&record.movements)),
        total_tenure: Some(record.total_tenure),
        current_stint: record.current_stint.map(LocalStint::from),
        notes: Some(export(&record.notes)),
        status: Some(record.status),
        last_updated: Some(record.last_updated),
    }
}

/// Convert a record into a remote row owned by `clan_tag`.
pub fn to_remote_shape(record: &PlayerHistoryRecord, clan_tag: &str) -> RemoteShape {
    RemoteShape {
        tag: record.tag.clone(),
        clan_tag: Some(clan_tag.to_string()),
        primary_name: non_empty(&record.primary_name),
        aliases: Some(export(&record.aliases)),
        movements: Some(export(&record.movements)),
        total_tenure: Some(record.total_tenure),
        current_stint: record.current_stint.map(RemoteStint::from),
        notes: Some(export(&record.notes)),
        status: Some(record.status),
        last_updated: Some(record.last_updated),
        updated_at: None,
    }
}

impl From<LocalShape> for PlayerHistoryRecord {
    fn from(shape: LocalShape) -> Self {
        from_local_shape(shape)
    }
}

impl From<RemoteShape> for PlayerHistoryRecord {
    fn from(shape: RemoteShape) -> Self {
        from_remote_shape(shape)
    }
}

fn import<S, T: From<S>>(items: Option<Vec<S>>) -> Vec<T> {
    items.unwrap_or_default().into_iter().map(T::from).collect()
}

fn export<'a, T, S: From<&'a T>>(items: &'a [T]) -> Vec<S> {
    items.iter().map(S::from).collect()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn alias_from_parts(
    name: String,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
) -> Alias {
    let first = first_seen.or(last_seen).unwrap_or_default();
    let last = last_seen.or(first_seen).unwrap_or_default();
    Alias {
        name,
        first_seen: first,
        last_seen: last.max(first),
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    tag: PlayerTag,
    primary_name: Option<String>,
    aliases: Vec<Alias>,
    movements: Vec<Movement>,
    total_tenure: Option<u32>,
    current_stint: Option<Stint>,
    notes: Vec<Note>,
    status: Option<MemberStatus>,
    last_updated: Option<DateTime<Utc>>,
) -> PlayerHistoryRecord {
    let mut record = PlayerHistoryRecord {
        tag,
        primary_name: primary_name.unwrap_or_default(),
        aliases,
        movements,
        total_tenure: total_tenure.unwrap_or(0),
        current_stint,
        notes,
        status: MemberStatus::Applicant,
        last_updated: DateTime::<Utc>::default(),
    };
    record.canonicalize();

    record.status = status.unwrap_or_else(|| infer_status(&record));
    record.last_updated = last_updated.unwrap_or_else(|| latest_timestamp(&record));
    record
}

/// Status for shapes that omit it: the latest movement decides, else the stint.
fn infer_status(record: &PlayerHistoryRecord) -> MemberStatus {
    match record.derived_status() {
        Some(status) => status,
        None if record.current_stint.is_some_and(|s| s.is_active) => MemberStatus::Active,
        None => MemberStatus::Applicant,
    }
}

/// Newest timestamp mentioned anywhere in the record, epoch if none.
fn latest_timestamp(record: &PlayerHistoryRecord) -> DateTime<Utc> {
    let movement_dates = record.movements.iter().map(|m| m.date);
    let alias_dates = record.aliases.iter().map(|a| a.last_seen);
    let note_dates = record.notes.iter().map(|n| n.timestamp);
    let stint_date = record.current_stint.map(|s| s.start_date);

    movement_dates
        .chain(alias_dates)
        .chain(note_dates)
        .chain(stint_date)
        .max()
        .unwrap_or_default()
}
