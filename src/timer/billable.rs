use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::{
    storage::{
        entities::{Project, RecordId, TimeEntry},
        record_storage::RecordStore,
        scratch::{SnapshotError, TargetKey},
    },
    utils::time::as_hours,
};

use super::{engine::TimerEngine, tracking::Tracking};

/// Billable time tracked against a [Project].
#[derive(Debug, Clone, Copy, Default)]
pub struct Billable;

impl Tracking for Billable {
    type Target = Project;
    type Record = TimeEntry;

    const SCRATCH_KEY: &'static str = "billable_timer";

    fn target_key(&self, project: &Project) -> TargetKey {
        TargetKey::Project {
            project_id: project.id,
        }
    }

    fn target_label(&self, project: &Project) -> String {
        project.name.clone()
    }

    async fn resolve_target<S: RecordStore>(
        &self,
        store: &S,
        key: &TargetKey,
    ) -> Result<Option<Project>> {
        match key {
            TargetKey::Project { project_id } => store.get::<Project>(*project_id).await,
            other => Err(SnapshotError::WrongTarget {
                expected: "billable",
                found: other.clone(),
            }
            .into()),
        }
    }

    fn create_record(
        &self,
        project: &Project,
        id: RecordId,
        started_at: DateTime<Utc>,
        notes: &str,
    ) -> TimeEntry {
        TimeEntry::with_id(id, project.id, started_at, notes.to_string())
    }

    fn set_notes(&self, entry: &mut TimeEntry, notes: &str) {
        entry.notes = notes.to_string();
    }

    /// Entries only know their interval, so paused time is expressed as a manual duration.
    fn finalize(
        &self,
        entry: &mut TimeEntry,
        ended_at: DateTime<Utc>,
        paused: Duration,
        _interruptions: u32,
    ) {
        entry.end_time = Some(ended_at);
        if paused > Duration::zero() {
            entry.manual_duration =
                Some(((ended_at - entry.start_time) - paused).max(Duration::zero()));
        }
    }

    fn is_open(&self, entry: &TimeEntry) -> bool {
        entry.is_running()
    }

    async fn on_start<S: RecordStore>(
        &self,
        store: &S,
        project: &mut Project,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut stored) = store.get::<Project>(project.id).await? else {
            warn!("Project {} is not stored, last use is not recorded", project.id);
            return Ok(());
        };
        stored.last_used_at = now;
        store.insert(stored).await?;
        store.save().await?;
        project.last_used_at = now;
        Ok(())
    }
}

impl<S: RecordStore> TimerEngine<Billable, S> {
    /// Earnings of the running entry at the project's rate.
    pub fn current_earnings(&self) -> f64 {
        self.current_target()
            .map(|project| as_hours(self.elapsed_time()) * project.hourly_rate)
            .unwrap_or(0.)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        storage::{
            entities::{Project, TimeEntry},
            record_storage::{JsonRecordStore, Query, RecordStore},
            scratch::FileScratchStore,
        },
        timer::{engine::TimerEngine, tracking::Tracking},
        utils::clock::{testing::ManualClock, Clock},
    };

    use super::Billable;

    #[tokio::test]
    async fn test_earnings_and_last_used() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let created_at = clock.time();
        let records = Arc::new(JsonRecordStore::new(dir.path().join("records"))?);
        let project = Project::new("Audit".into(), 90., None, created_at);
        records.insert(project.clone()).await?;

        let mut engine = TimerEngine::new(
            Billable,
            records.clone(),
            Arc::new(FileScratchStore::new(dir.path().join("scratch.json"))),
            Arc::new(clock.clone()),
            Duration::from_secs(1),
        );
        assert_eq!(engine.current_earnings(), 0.);

        clock.advance(chrono::Duration::days(1));
        engine.start(project.clone(), "").await;
        clock.advance(chrono::Duration::minutes(40));
        assert!((engine.current_earnings() - 60.).abs() < 1e-9);

        let stored = records.get::<Project>(project.id).await?;
        assert_eq!(
            stored.map(|p| p.last_used_at),
            Some(created_at + chrono::Duration::days(1))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_start_does_not_recreate_deleted_project() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let records = Arc::new(JsonRecordStore::new(dir.path().join("records"))?);
        let project = Project::new("Audit".into(), 90., None, clock.time());
        records.insert(project.clone()).await?;
        records.save().await?;
        records.delete::<Project>(project.id).await?;
        records.save().await?;

        let mut engine = TimerEngine::new(
            Billable,
            records.clone(),
            Arc::new(FileScratchStore::new(dir.path().join("scratch.json"))),
            Arc::new(clock.clone()),
            Duration::from_secs(1),
        );
        engine.start(project.clone(), "").await;
        assert_eq!(records.get::<Project>(project.id).await?, None);

        let reopened = JsonRecordStore::new(dir.path().join("records"))?;
        assert_eq!(reopened.get::<Project>(project.id).await?, None);

        clock.advance(chrono::Duration::minutes(10));
        assert!(engine.stop().await.is_none());
        assert!(records.fetch(Query::<TimeEntry>::all()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_keeps_stored_project_fields() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let records = Arc::new(JsonRecordStore::new(dir.path().join("records"))?);
        let project = Project::new("Audit".into(), 90., None, clock.time());
        let mut renamed = project.clone();
        renamed.name = "Security audit".into();
        records.insert(renamed).await?;

        let mut engine = TimerEngine::new(
            Billable,
            records.clone(),
            Arc::new(FileScratchStore::new(dir.path().join("scratch.json"))),
            Arc::new(clock.clone()),
            Duration::from_secs(1),
        );
        clock.advance(chrono::Duration::hours(2));
        engine.start(project.clone(), "").await;

        let stored = records.get::<Project>(project.id).await?;
        assert_eq!(stored.as_ref().map(|p| p.name.as_str()), Some("Security audit"));
        assert_eq!(stored.map(|p| p.last_used_at), Some(clock.time()));
        Ok(())
    }

    #[test]
    fn test_unpaused_entry_has_no_manual_duration() {
        let clock = ManualClock::new();
        let project = Project::new("Audit".into(), 90., None, clock.time());
        let mut entry = Billable.create_record(&project, uuid::Uuid::new_v4(), clock.time(), "");

        Billable.finalize(
            &mut entry,
            clock.time() + chrono::Duration::hours(1),
            chrono::Duration::zero(),
            0,
        );
        assert_eq!(entry.manual_duration, None);
        assert_eq!(entry.duration(clock.time()), chrono::Duration::hours(1));
    }
}
