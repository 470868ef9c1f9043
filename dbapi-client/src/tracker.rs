//! Snapshot tracking for optimistic updates.
//!
//! Every fetched or inserted record is snapshotted under its table and an
//! opaque [`TrackHandle`]. An update matches the stored row by the whole
//! snapshot, so a concurrent write between fetch and update makes the WHERE
//! clause match nothing instead of overwriting the other change.
//!
//! A snapshot lives as long as the [`Tracked`] value that carries its handle.
//! Snapshots are not refreshed after an update; a second update of the same
//! record needs a re-fetch first.

use crate::error::ClientError;
use dashmap::DashMap;
use dbapi_protocol::message::update_body;
use dbapi_protocol::{Conjunction, Encoder, Record, SchemaDescriptor, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Opaque identity of one tracked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackHandle(u64);

impl fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A record together with the handle of its snapshot.
///
/// Returned by fetch and insert; present it to update and delete. Dropping
/// it, or taking the record out with [`Tracked::into_inner`], discards the
/// snapshot.
#[derive(Debug)]
pub struct Tracked<R> {
    table: String,
    handle: TrackHandle,
    snapshots: Weak<Mutex<HashMap<TrackHandle, Snapshot>>>,
    record: R,
}

impl<R> Tracked<R> {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn handle(&self) -> TrackHandle {
        self.handle
    }

    pub fn record(&self) -> &R {
        &self.record
    }
}

impl<R: Default> Tracked<R> {
    /// Takes the record out and discards its snapshot.
    pub fn into_inner(mut self) -> R {
        std::mem::take(&mut self.record)
    }
}

impl<R> Drop for Tracked<R> {
    fn drop(&mut self) {
        if let Some(snapshots) = self.snapshots.upgrade() {
            snapshots.lock().remove(&self.handle);
        }
    }
}

impl<R> Deref for Tracked<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.record
    }
}

impl<R> DerefMut for Tracked<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.record
    }
}

/// SET and WHERE clauses of an optimistic update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub set_clause: String,
    pub where_clause: String,
}

impl UpdateRequest {
    /// True when no field changed since the snapshot.
    pub fn is_empty(&self) -> bool {
        self.set_clause.is_empty()
    }

    /// `<set-clause>|<where-clause>`.
    pub fn body(&self) -> String {
        update_body(&self.set_clause, &self.where_clause)
    }
}

#[derive(Debug)]
struct Snapshot {
    schema: Arc<SchemaDescriptor>,
    /// Values as last persisted; the WHERE clause matches these.
    persisted: Vec<Value>,
    /// Values of the record as handed out; SET lists fields that differ.
    baseline: Vec<Value>,
    identity: Option<Value>,
}

type TableSnapshots = Arc<Mutex<HashMap<TrackHandle, Snapshot>>>;

/// Table-scoped snapshot store.
///
/// Each table has its own lock; operations on one table are serialised while
/// different tables proceed independently.
#[derive(Debug, Default)]
pub struct EntityTracker {
    tables: DashMap<String, TableSnapshots>,
    next_handle: AtomicU64,
}

impl EntityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table: &str) -> Option<TableSnapshots> {
        self.tables.get(table).map(|entry| Arc::clone(entry.value()))
    }

    fn table_or_create(&self, table: &str) -> TableSnapshots {
        if let Some(snapshots) = self.table(table) {
            return snapshots;
        }
        Arc::clone(self.tables.entry(table.to_string()).or_default().value())
    }

    fn insert(&self, table: &str, snapshot: Snapshot) -> (TrackHandle, TableSnapshots) {
        let handle = TrackHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let snapshots = self.table_or_create(table);
        snapshots.lock().insert(handle, snapshot);
        tracing::trace!(table, %handle, "Tracked record");
        (handle, snapshots)
    }

    /// Snapshots the current field values of `record` under `table`.
    ///
    /// The snapshot stays until untracked; use [`EntityTracker::track_record`]
    /// to tie it to a [`Tracked`] instead.
    pub fn track<R: Record>(&self, table: &str, schema: &Arc<SchemaDescriptor>, record: &R) -> TrackHandle {
        let values = schema.values_of(record);
        let snapshot = Snapshot {
            schema: Arc::clone(schema),
            identity: schema.identity_value(record),
            baseline: values.clone(),
            persisted: values,
        };
        self.insert(table, snapshot).0
    }

    /// Snapshots `record` as it was just written.
    pub fn track_record<R: Record>(
        &self,
        table: &str,
        schema: &Arc<SchemaDescriptor>,
        record: R,
    ) -> Tracked<R> {
        let persisted = schema.values_of(&record);
        self.track_decoded(table, schema, record, persisted)
    }

    /// Snapshots a decoded row.
    ///
    /// `persisted` holds the wire values in ordinal order. They can differ
    /// from the record's own values where a NULL was read into a
    /// non-optional field.
    pub fn track_decoded<R: Record>(
        &self,
        table: &str,
        schema: &Arc<SchemaDescriptor>,
        record: R,
        persisted: Vec<Value>,
    ) -> Tracked<R> {
        let identity = schema
            .identity_index()
            .and_then(|idx| persisted.get(idx).cloned());
        let snapshot = Snapshot {
            schema: Arc::clone(schema),
            baseline: schema.values_of(&record),
            persisted,
            identity,
        };
        let (handle, snapshots) = self.insert(table, snapshot);
        Tracked {
            table: table.to_string(),
            handle,
            snapshots: Arc::downgrade(&snapshots),
            record,
        }
    }

    pub fn is_tracked(&self, table: &str, handle: TrackHandle) -> bool {
        self.table(table)
            .is_some_and(|snapshots| snapshots.lock().contains_key(&handle))
    }

    /// Last persisted values in ordinal order.
    pub fn snapshot(&self, table: &str, handle: TrackHandle) -> Option<Vec<Value>> {
        self.table(table)
            .and_then(|snapshots| snapshots.lock().get(&handle).map(|s| s.persisted.clone()))
    }

    /// Removes one snapshot. Returns whether it existed.
    pub fn untrack(&self, table: &str, handle: TrackHandle) -> bool {
        self.table(table)
            .is_some_and(|snapshots| snapshots.lock().remove(&handle).is_some())
    }

    /// Removes every snapshot in `table` whose identity equals `id`.
    pub fn untrack_by_id(&self, table: &str, id: &Value) -> usize {
        let Some(snapshots) = self.table(table) else {
            return 0;
        };
        let mut snapshots = snapshots.lock();
        let before = snapshots.len();
        snapshots.retain(|_, snapshot| snapshot.identity.as_ref() != Some(id));
        before - snapshots.len()
    }

    /// Removes every snapshot of `table`.
    pub fn untrack_table(&self, table: &str) -> usize {
        self.tables
            .remove(table)
            .map(|(_, snapshots)| snapshots.lock().len())
            .unwrap_or(0)
    }

    /// Number of snapshots held for `table`.
    pub fn tracked_in(&self, table: &str) -> usize {
        self.table(table)
            .map(|snapshots| snapshots.lock().len())
            .unwrap_or(0)
    }

    /// Builds the optimistic update for a tracked record.
    ///
    /// SET lists the fields whose current value differs from the snapshot;
    /// WHERE matches every snapshotted value.
    pub fn build_update_request<R: Record>(
        &self,
        table: &str,
        handle: TrackHandle,
        record: &R,
    ) -> Result<UpdateRequest, ClientError> {
        let not_tracked = || ClientError::NotTracked {
            table: table.to_string(),
            handle,
        };
        let snapshots = self.table(table).ok_or_else(not_tracked)?;
        let snapshots = snapshots.lock();
        let snapshot = snapshots.get(&handle).ok_or_else(not_tracked)?;

        let schema = &snapshot.schema;
        let current = schema.values_of(record);
        let changed = schema
            .fields()
            .iter()
            .zip(current.iter())
            .zip(snapshot.baseline.iter())
            .filter(|((_, now), before)| now != before)
            .map(|(term, _)| term);

        let set_clause = Encoder::encode_predicate(changed, Conjunction::Set)?;
        let where_clause = Encoder::encode_predicate(
            schema.fields().iter().zip(snapshot.persisted.iter()),
            Conjunction::Where,
        )?;

        Ok(UpdateRequest {
            set_clause,
            where_clause,
        })
    }
}
