use std::{fmt::Debug, future::Future};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::storage::{
    entities::RecordId,
    record_storage::{Record, RecordStore},
    scratch::TargetKey,
};

/// A kind of tracked work. Knows what is being tracked (the target), which record it produces
/// and how both are found again from a [TargetKey] after a restart.
pub trait Tracking {
    type Target: Clone + Debug + Send + Sync;
    type Record: Record<Id = RecordId> + Debug;

    /// Key of the scratch snapshot for this kind. Different kinds never share a key.
    const SCRATCH_KEY: &'static str;

    fn target_key(&self, target: &Self::Target) -> TargetKey;

    /// Human readable name of the target, used for status output and logs.
    fn target_label(&self, target: &Self::Target) -> String;

    /// `Ok(None)` means the target no longer exists.
    fn resolve_target<S: RecordStore>(
        &self,
        store: &S,
        key: &TargetKey,
    ) -> impl Future<Output = Result<Option<Self::Target>>>;

    /// Builds a record that is not persisted yet.
    fn create_record(
        &self,
        target: &Self::Target,
        id: RecordId,
        started_at: DateTime<Utc>,
        notes: &str,
    ) -> Self::Record;

    fn set_notes(&self, record: &mut Self::Record, notes: &str);

    /// Closes the record. `paused` is the total time the timer spent paused.
    fn finalize(
        &self,
        record: &mut Self::Record,
        ended_at: DateTime<Utc>,
        paused: Duration,
        interruptions: u32,
    );

    fn is_open(&self, record: &Self::Record) -> bool;

    fn planned_duration(&self, _record: &Self::Record) -> Option<Duration> {
        None
    }

    /// Called before the record of a fresh start is created.
    fn on_start<S: RecordStore>(
        &self,
        _store: &S,
        _target: &mut Self::Target,
        _now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> {
        async { Ok(()) }
    }
}
