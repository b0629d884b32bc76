use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::{
    storage::{
        entities::{FocusSession, RecordId, SessionType, TaskCategory},
        record_storage::RecordStore,
        scratch::{SnapshotError, TargetKey},
    },
    utils::validation::{validate_rating, ValidationError},
};

use super::{engine::TimerEngine, tracking::Tracking};

/// What a focus session is about. Unlike projects it isn't stored anywhere, so it always
/// resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusTarget {
    pub session_type: SessionType,
    pub category: TaskCategory,
    pub planned_duration: Duration,
    pub task_title: Option<String>,
}

impl FocusTarget {
    pub fn new(session_type: SessionType, category: TaskCategory) -> Self {
        Self {
            session_type,
            category,
            planned_duration: session_type.default_duration(),
            task_title: None,
        }
    }

    pub fn with_planned_duration(mut self, planned_duration: Duration) -> Self {
        self.planned_duration = planned_duration;
        self
    }

    pub fn with_task(mut self, task_title: Option<String>) -> Self {
        self.task_title = task_title.filter(|title| !title.trim().is_empty());
        self
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::Focus {
            session_type: self.session_type,
            category: self.category,
            planned_duration: self.planned_duration,
            task_title: self.task_title.clone(),
        }
    }
}

/// Focus sessions with a planned length, interruption count and an optional reflection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Focus;

fn optional_notes(notes: &str) -> Option<String> {
    (!notes.is_empty()).then(|| notes.to_string())
}

impl Tracking for Focus {
    type Target = FocusTarget;
    type Record = FocusSession;

    const SCRATCH_KEY: &'static str = "focus_timer";

    fn target_key(&self, target: &FocusTarget) -> TargetKey {
        target.key()
    }

    fn target_label(&self, target: &FocusTarget) -> String {
        match &target.task_title {
            Some(task) => format!("{} ({}): {task}", target.session_type, target.category),
            None => format!("{} ({})", target.session_type, target.category),
        }
    }

    async fn resolve_target<S: RecordStore>(
        &self,
        _store: &S,
        key: &TargetKey,
    ) -> Result<Option<FocusTarget>> {
        match key {
            TargetKey::Focus {
                session_type,
                category,
                planned_duration,
                task_title,
            } => Ok(Some(FocusTarget {
                session_type: *session_type,
                category: *category,
                planned_duration: *planned_duration,
                task_title: task_title.clone(),
            })),
            other => Err(SnapshotError::WrongTarget {
                expected: "focus",
                found: other.clone(),
            }
            .into()),
        }
    }

    fn create_record(
        &self,
        target: &FocusTarget,
        id: RecordId,
        started_at: DateTime<Utc>,
        notes: &str,
    ) -> FocusSession {
        FocusSession {
            id,
            session_type: target.session_type,
            category: target.category,
            start_time: started_at,
            end_time: None,
            planned_duration: target.planned_duration,
            total_paused: Duration::zero(),
            interruption_count: 0,
            focus_quality: None,
            energy_level: None,
            task_title: target.task_title.clone(),
            notes: optional_notes(notes),
        }
    }

    fn set_notes(&self, session: &mut FocusSession, notes: &str) {
        session.notes = optional_notes(notes);
    }

    fn finalize(
        &self,
        session: &mut FocusSession,
        ended_at: DateTime<Utc>,
        paused: Duration,
        interruptions: u32,
    ) {
        session.end_time = Some(ended_at);
        session.total_paused = paused;
        session.interruption_count = interruptions;
    }

    fn is_open(&self, session: &FocusSession) -> bool {
        session.is_active()
    }

    fn planned_duration(&self, session: &FocusSession) -> Option<Duration> {
        Some(session.planned_duration)
    }
}

impl<S: RecordStore> TimerEngine<Focus, S> {
    /// Planned time left, zero once the plan is exceeded.
    pub fn remaining(&self) -> Option<Duration> {
        self.current_target().map(|target| {
            (target.planned_duration - self.elapsed_time()).max(Duration::zero())
        })
    }

    /// Share of the planned duration already spent, capped at 1.
    pub fn progress(&self) -> Option<f64> {
        let target = self.current_target()?;
        if target.planned_duration <= Duration::zero() {
            return Some(0.);
        }
        let ratio = self.elapsed_time().num_milliseconds() as f64
            / target.planned_duration.num_milliseconds() as f64;
        Some(ratio.min(1.))
    }

    pub fn interruptions(&self) -> u32 {
        self.active()
            .map(|active| active.interruptions)
            .unwrap_or(0)
    }

    /// Returns false when no session is active.
    pub async fn record_interruption(&mut self) -> bool {
        self.update_active(|_, active| active.interruptions += 1)
            .await
    }

    /// Stops the session with the user's reflection. Ratings are on a 1-5 scale, invalid ratings
    /// leave the session running.
    pub async fn stop_with_reflection(
        &mut self,
        focus_quality: Option<u8>,
        energy_level: Option<u8>,
    ) -> Result<Option<FocusSession>, ValidationError> {
        if let Some(quality) = focus_quality {
            validate_rating("focus quality", quality)?;
        }
        if let Some(energy) = energy_level {
            validate_rating("energy level", energy)?;
        }

        if let Some(active) = self.active_mut() {
            active.record.focus_quality = focus_quality;
            active.record.energy_level = energy_level;
        }
        Ok(self.stop().await)
    }
}
