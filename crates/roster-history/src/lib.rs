//! roster-history: Membership history for clan rosters, with local/remote reconciliation.
//!
//! This crate provides the core functionality for:
//! - The canonical `PlayerHistoryRecord` and its storage shapes
//! - Lifecycle operations (join, depart, return, rename)
//! - Merging a device-cached record with its remote copy
//! - Orchestrating the sync of every cached record into the remote store

pub mod events;
pub mod lifecycle;
pub mod merge;
pub mod record;
pub mod shape;
pub mod store;
pub mod sync;
pub mod tag;

pub use events::{EventBus, SyncEvent};
pub use lifecycle::{
    add_alias, apply_lifecycle_event, detect_departures, detect_returns, record_acceptance,
    record_departure, record_return, DepartureDetails, DetectedReturn, LifecycleEvent,
    ReturnDetails, RosterEntry, ValidationError,
};
pub use merge::{merge_records, merge_remote_row, try_merge_records, MergeError};
pub use record::{Alias, MemberStatus, Movement, MovementKind, Note, PlayerHistoryRecord, Stint};
pub use shape::{from_local_shape, from_remote_shape, LocalShape, RemoteShape};
pub use store::{CachedRecord, InMemoryCache, InMemoryRemote, LocalCache, RemoteStore, StoreError};
pub use sync::{SyncError, SyncFailure, SyncOrchestrator, SyncReport};
pub use tag::{PlayerTag, TagError};
