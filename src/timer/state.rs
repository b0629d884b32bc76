use chrono::{DateTime, Duration, Utc};

use crate::storage::{
    record_storage::Record,
    scratch::{ActiveSnapshot, TargetKey},
};

use super::tracking::Tracking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
}

/// What presentation adapters see through [super::engine::TimerEngine::subscribe].
#[derive(Debug, Clone, PartialEq)]
pub struct TimerStatus {
    pub phase: TimerPhase,
    pub elapsed: Duration,
    pub target: Option<String>,
    pub planned: Option<Duration>,
    /// Incremented on every transition, refreshes never change it.
    pub generation: u64,
}

impl TimerStatus {
    pub fn idle(generation: u64) -> Self {
        Self {
            phase: TimerPhase::Idle,
            elapsed: Duration::zero(),
            target: None,
            planned: None,
            generation,
        }
    }
}

/// The part of a timer needed to compute elapsed time. Cheap to copy into the refresh task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub accumulated_pause: Duration,
}

impl TimeWindow {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            paused_at: None,
            accumulated_pause: Duration::zero(),
        }
    }

    /// Time tracked up to `now`. While paused the result is frozen at the pause moment.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        let reference = self.paused_at.unwrap_or(now);
        ((reference - self.started_at) - self.accumulated_pause).max(Duration::zero())
    }

    /// Total paused time, counting a pause that is still ongoing.
    pub fn total_pause_at(&self, now: DateTime<Utc>) -> Duration {
        let ongoing = self
            .paused_at
            .map(|paused_at| (now - paused_at).max(Duration::zero()))
            .unwrap_or_else(Duration::zero);
        self.accumulated_pause + ongoing
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Returns false when already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Returns false when not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        let Some(paused_at) = self.paused_at.take() else {
            return false;
        };
        self.accumulated_pause += (now - paused_at).max(Duration::zero());
        true
    }
}

/// In-memory state of a tracking timer.
pub struct ActiveTimer<T: Tracking> {
    pub target: T::Target,
    pub record: T::Record,
    pub window: TimeWindow,
    pub notes: String,
    pub interruptions: u32,
}

impl<T: Tracking> ActiveTimer<T> {
    pub fn new(target: T::Target, record: T::Record, started_at: DateTime<Utc>, notes: String) -> Self {
        Self {
            target,
            record,
            window: TimeWindow::new(started_at),
            notes,
            interruptions: 0,
        }
    }

    pub fn from_snapshot(target: T::Target, record: T::Record, snapshot: ActiveSnapshot) -> Self {
        Self {
            target,
            record,
            window: TimeWindow {
                started_at: snapshot.started_at,
                paused_at: snapshot.paused_at,
                accumulated_pause: snapshot.accumulated_pause,
            },
            notes: snapshot.notes,
            interruptions: snapshot.interruptions,
        }
    }

    pub fn snapshot(&self, target: TargetKey) -> ActiveSnapshot {
        ActiveSnapshot {
            target,
            record_id: self.record.id(),
            started_at: self.window.started_at,
            notes: self.notes.clone(),
            is_paused: self.window.is_paused(),
            paused_at: self.window.paused_at,
            accumulated_pause: self.window.accumulated_pause,
            interruptions: self.interruptions,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.window.is_paused() {
            TimerPhase::Paused
        } else {
            TimerPhase::Running
        }
    }
}
