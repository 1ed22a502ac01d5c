//! Lifecycle operations: join, depart, return and rename.
//!
//! Every operation takes the current record by reference and returns an
//! updated copy. Validation happens before anything is changed, so an `Err`
//! means the caller's record is exactly as it was.

use crate::record::{
    alias_key, Alias, MemberStatus, Movement, MovementKind, Note, PlayerHistoryRecord, Stint,
};
use crate::tag::PlayerTag;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Tenure must not be negative (got {0})")]
    NegativeTenure(i64),

    #[error("Tenure {0} is out of range")]
    TenureOutOfRange(i64),

    #[error("Cannot {action} {tag}: player is {status:?}")]
    InvalidTransition {
        tag: PlayerTag,
        status: MemberStatus,
        action: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Parameters for [`record_departure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartureDetails {
    pub departure_reason: Option<String>,
    /// Days served in the stint that is ending.
    pub tenure_at_departure: i64,
    pub departure_notes: Option<String>,
}

/// Parameters for [`record_return`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnDetails {
    /// Display name seen on the roster when the player came back.
    pub observed_name: Option<String>,
    /// Days of earlier tenure to credit. Never inferred.
    pub award_previous_tenure: Option<i64>,
    pub return_notes: Option<String>,
}

/// A lifecycle transition to apply to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Applicant accepted into the clan.
    Accepted,
    Departed(DepartureDetails),
    Returned(ReturnDetails),
    /// Player seen under a (possibly new) display name.
    AliasSeen(String),
}

/// One member of a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub tag: PlayerTag,
    pub name: String,
}

/// A departed player who shows up on the roster again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedReturn<'a> {
    pub entry: &'a RosterEntry,
    pub record: &'a PlayerHistoryRecord,
    /// The roster shows a different name than the stored `primary_name`.
    pub name_changed: bool,
}

/// Apply one event. Single entry point over the per-transition functions.
pub fn apply_lifecycle_event(
    record: &PlayerHistoryRecord,
    event: LifecycleEvent,
    now: DateTime<Utc>,
) -> Result<PlayerHistoryRecord> {
    match event {
        LifecycleEvent::Accepted => record_acceptance(record, now),
        LifecycleEvent::Departed(details) => record_departure(record, details, now),
        LifecycleEvent::Returned(details) => record_return(record, details, now),
        LifecycleEvent::AliasSeen(name) => Ok(add_alias(record, &name, now)),
    }
}

/// Remember `new_name` as an alias.
///
/// A case-insensitive match refreshes that alias's `last_seen`; anything else
/// is appended. Blank names are ignored.
pub fn add_alias(
    record: &PlayerHistoryRecord,
    new_name: &str,
    now: DateTime<Utc>,
) -> PlayerHistoryRecord {
    let key = alias_key(new_name);
    let mut next = record.clone();
    if key.is_empty() {
        return next;
    }

    match next.aliases.iter_mut().find(|a| a.key() == key) {
        Some(existing) => existing.last_seen = existing.last_seen.max(now),
        None => next.aliases.push(Alias::new(new_name, now)),
    }
    next.last_updated = next.last_updated.max(now);
    next
}

/// Move an applicant into active membership.
pub fn record_acceptance(
    record: &PlayerHistoryRecord,
    now: DateTime<Utc>,
) -> Result<PlayerHistoryRecord> {
    require_status(record, MemberStatus::Applicant, "accept")?;

    let mut next = record.clone();
    next.movements.push(Movement::new(MovementKind::Joined, now));
    next.current_stint = Some(Stint::open(now));
    next.status = MemberStatus::Active;
    next.notes.push(Note::new(now, "Accepted into clan").with_field("event", "joined"));
    next.last_updated = now;
    Ok(next)
}

/// Record that an active member left.
pub fn record_departure(
    record: &PlayerHistoryRecord,
    details: DepartureDetails,
    now: DateTime<Utc>,
) -> Result<PlayerHistoryRecord> {
    let tenure = checked_tenure(details.tenure_at_departure)?;
    require_status(record, MemberStatus::Active, "record departure of")?;

    let mut next = record.clone();
    next.movements.push(Movement {
        date: now,
        kind: MovementKind::Departed,
        reason: details.departure_reason.clone(),
        tenure_at_departure: Some(tenure),
        notes: details.departure_notes.clone(),
    });
    if let Some(stint) = next.current_stint.as_mut() {
        stint.is_active = false;
    }
    next.status = MemberStatus::Departed;

    let text = details
        .departure_notes
        .unwrap_or_else(|| "Player departed".to_string());
    let mut note = Note::new(now, text)
        .with_field("event", "departed")
        .with_field("tenure", tenure.to_string());
    if let Some(reason) = details.departure_reason {
        note = note.with_field("reason", reason);
    }
    next.notes.push(note);
    next.last_updated = now;
    Ok(next)
}

/// Record that a departed player came back.
///
/// A different `observed_name` retires the old primary name into the
/// aliases. Previous tenure is only credited when explicitly awarded.
pub fn record_return(
    record: &PlayerHistoryRecord,
    details: ReturnDetails,
    now: DateTime<Utc>,
) -> Result<PlayerHistoryRecord> {
    let award = details.award_previous_tenure.map(checked_tenure).transpose()?;
    require_status(record, MemberStatus::Departed, "record return of")?;
    let total_tenure = match award {
        Some(days) => record
            .total_tenure
            .checked_add(days)
            .ok_or(ValidationError::TenureOutOfRange(i64::from(days)))?,
        None => record.total_tenure,
    };

    let mut next = record.clone();
    let mut previous_name = None;
    if let Some(observed) = details.observed_name.filter(|n| !n.trim().is_empty()) {
        if observed != next.primary_name {
            next = add_alias(&next, &record.primary_name, now);
            previous_name = Some(std::mem::replace(&mut next.primary_name, observed));
        }
    }

    next.movements.push(Movement {
        date: now,
        kind: MovementKind::Returned,
        reason: None,
        tenure_at_departure: None,
        notes: details.return_notes.clone(),
    });
    next.current_stint = Some(Stint::open(now));
    next.total_tenure = total_tenure;
    next.status = MemberStatus::Active;

    let text = details
        .return_notes
        .unwrap_or_else(|| "Player returned".to_string());
    let mut note = Note::new(now, text)
        .with_field("event", "returned")
        .with_field("tenure_awarded", award.is_some().to_string())
        .with_field("awarded_days", award.unwrap_or(0).to_string());
    if let Some(name) = previous_name {
        note = note.with_field("previous_name", name);
    }
    next.notes.push(note);
    next.last_updated = now;
    Ok(next)
}

/// Find departed players who appear in the current roster snapshot.
pub fn detect_returns<'a>(
    current_roster_entries: &'a [RosterEntry],
    database: &'a [PlayerHistoryRecord],
) -> Vec<DetectedReturn<'a>> {
    let by_tag: HashMap<&PlayerTag, &PlayerHistoryRecord> =
        database.iter().map(|r| (&r.tag, r)).collect();

    current_roster_entries
        .iter()
        .filter_map(|entry| {
            let record = *by_tag.get(&entry.tag)?;
            (record.status == MemberStatus::Departed).then(|| DetectedReturn {
                entry,
                record,
                name_changed: entry.name != record.primary_name,
            })
        })
        .collect()
}

/// Find active players missing from the current roster snapshot.
pub fn detect_departures<'a>(
    current_roster_entries: &[RosterEntry],
    database: &'a [PlayerHistoryRecord],
) -> Vec<&'a PlayerHistoryRecord> {
    let present: HashSet<&PlayerTag> = current_roster_entries.iter().map(|e| &e.tag).collect();

    database
        .iter()
        .filter(|r| r.status == MemberStatus::Active && !present.contains(&r.tag))
        .collect()
}

fn checked_tenure(days: i64) -> Result<u32> {
    if days < 0 {
        return Err(ValidationError::NegativeTenure(days));
    }
    u32::try_from(days).map_err(|_| ValidationError::TenureOutOfRange(days))
}

fn require_status(
    record: &PlayerHistoryRecord,
    expected: MemberStatus,
    action: &'static str,
) -> Result<()> {
    if record.status == expected {
        Ok(())
    } else {
        Err(ValidationError::InvalidTransition {
            tag: record.tag.clone(),
            status: record.status,
            action,
        })
    }
}
