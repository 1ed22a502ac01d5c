//! Merge engine: reconcile the cached and remote copies of one player's history.
//!
//! Collections are unioned (nothing in the history is ever dropped), tenure
//! takes the larger side, and the remote copy decides the "current state"
//! fields whenever it has them. Fields a remote row leaves out fall back to the
//! local copy; [`merge_remote_row`] keeps that true for `status`, which
//! normalization would otherwise infer. Merging is deterministic and idempotent:
//! with `m = merge(a, Some(b))`, both `merge(a, Some(m))` and
//! `merge(m, Some(b))` return `m`.

use crate::record::{
    canonical_aliases, canonical_movements, canonical_notes, MemberStatus, PlayerHistoryRecord,
};
use crate::shape::{from_remote_shape, RemoteShape};
use crate::tag::PlayerTag;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("Cannot merge records for different players: {local} vs {remote}")]
    TagMismatch { local: PlayerTag, remote: PlayerTag },
}

/// Merge a local record with its remote counterpart, if any.
///
/// Both records must describe the same tag; see [`try_merge_records`] for a
/// checked variant.
pub fn merge_records(
    local: &PlayerHistoryRecord,
    remote: Option<&PlayerHistoryRecord>,
) -> PlayerHistoryRecord {
    let Some(remote) = remote else {
        return local.clone().canonical();
    };
    debug_assert_eq!(local.tag, remote.tag, "merge_records called across tags");
    merge_with_status(local, remote, Some(remote.status))
}

/// Merge a local record with the raw row read from the remote store.
///
/// A row without `status` keeps the local status rather than one inferred
/// from the row's own history.
pub fn merge_remote_row(
    local: &PlayerHistoryRecord,
    remote: Option<RemoteShape>,
) -> Result<PlayerHistoryRecord, MergeError> {
    let Some(row) = remote else {
        return Ok(local.clone().canonical());
    };
    let remote_status = row.status;
    let remote = from_remote_shape(row);
    check_tags(local, &remote)?;
    Ok(merge_with_status(local, &remote, remote_status))
}

/// Like [`merge_records`] but rejects records for different players.
pub fn try_merge_records(
    local: &PlayerHistoryRecord,
    remote: Option<&PlayerHistoryRecord>,
) -> Result<PlayerHistoryRecord, MergeError> {
    if let Some(remote) = remote {
        check_tags(local, remote)?;
    }
    Ok(merge_records(local, remote))
}

fn check_tags(
    local: &PlayerHistoryRecord,
    remote: &PlayerHistoryRecord,
) -> Result<(), MergeError> {
    if remote.tag != local.tag {
        return Err(MergeError::TagMismatch {
            local: local.tag.clone(),
            remote: remote.tag.clone(),
        });
    }
    Ok(())
}

fn merge_with_status(
    local: &PlayerHistoryRecord,
    remote: &PlayerHistoryRecord,
    remote_status: Option<MemberStatus>,
) -> PlayerHistoryRecord {
    let movements = canonical_movements(
        local
            .movements
            .iter()
            .chain(&remote.movements)
            .cloned()
            .collect(),
    );
    let aliases = canonical_aliases(
        local
            .aliases
            .iter()
            .chain(&remote.aliases)
            .cloned()
            .collect(),
    );
    let notes = canonical_notes(local.notes.iter().chain(&remote.notes).cloned().collect());

    // The remote copy is authoritative for current state once it exists
    let primary_name = if remote.primary_name.is_empty() {
        local.primary_name.clone()
    } else {
        remote.primary_name.clone()
    };
    let current_stint = remote.current_stint.or(local.current_stint);

    PlayerHistoryRecord {
        tag: local.tag.clone(),
        primary_name,
        aliases,
        movements,
        total_tenure: local.total_tenure.max(remote.total_tenure),
        current_stint,
        notes,
        status: remote_status.unwrap_or(local.status),
        last_updated: local.last_updated.max(remote.last_updated),
    }
}
