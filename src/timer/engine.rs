use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    storage::{
        record_storage::{Query, Record, RecordStore},
        scratch::{ActiveSnapshot, ScratchSnapshot, ScratchStore},
    },
    utils::{clock::Clock, time::format_elapsed},
};

use super::{
    state::{ActiveTimer, TimerPhase, TimerStatus},
    ticker::Ticker,
    tracking::Tracking,
};

/// Pause/resume/stop state machine of one kind of tracking.
///
/// Every transition is mirrored into the [ScratchStore] right after the in-memory state changes,
/// so [TimerEngine::restore] can pick the timer up after the process dies. Finished records are
/// written into the record store only on stop.
///
/// None of the operations fail: storage problems are logged and the in-memory state stays the
/// source of truth.
pub struct TimerEngine<T: Tracking, S> {
    tracking: T,
    records: S,
    scratch: Arc<dyn ScratchStore>,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    active: Option<ActiveTimer<T>>,
    ticker: Option<Ticker>,
    generation: u64,
    status: Arc<watch::Sender<TimerStatus>>,
}

impl<T: Tracking, S: RecordStore> TimerEngine<T, S> {
    pub fn new(
        tracking: T,
        records: S,
        scratch: Arc<dyn ScratchStore>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(TimerStatus::idle(0));
        Self {
            tracking,
            records,
            scratch,
            clock,
            refresh_interval,
            active: None,
            ticker: None,
            generation: 0,
            status: Arc::new(status),
        }
    }

    pub fn records(&self) -> &S {
        &self.records
    }

    pub fn tracking(&self) -> &T {
        &self.tracking
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.window.is_paused())
    }

    pub fn phase(&self) -> TimerPhase {
        self.active
            .as_ref()
            .map(ActiveTimer::phase)
            .unwrap_or(TimerPhase::Idle)
    }

    /// Tracked time so far, zero when idle. Has no side effects.
    pub fn elapsed_time(&self) -> chrono::Duration {
        self.active
            .as_ref()
            .map(|active| active.window.elapsed_at(self.clock.time()))
            .unwrap_or_else(chrono::Duration::zero)
    }

    pub fn formatted_time(&self) -> String {
        format_elapsed(self.elapsed_time())
    }

    pub fn current_target(&self) -> Option<&T::Target> {
        self.active.as_ref().map(|active| &active.target)
    }

    pub fn current_notes(&self) -> &str {
        self.active
            .as_ref()
            .map(|active| active.notes.as_str())
            .unwrap_or_default()
    }

    /// The record being tracked. It isn't in the record store until the timer stops.
    pub fn active_record(&self) -> Option<&T::Record> {
        self.active.as_ref().map(|active| &active.record)
    }

    pub fn current_label(&self) -> Option<String> {
        self.current_target()
            .map(|target| self.tracking.target_label(target))
    }

    /// Status updates are published after every transition and on every refresh while running.
    pub fn subscribe(&self) -> watch::Receiver<TimerStatus> {
        self.status.subscribe()
    }

    /// Latest published status with the elapsed time computed now.
    pub fn status(&self) -> TimerStatus {
        let mut status = self.status.borrow().clone();
        status.elapsed = self.elapsed_time();
        status
    }

    /// Starts tracking `target`. A timer that is already tracking is stopped first.
    #[instrument(skip_all)]
    pub async fn start(&mut self, mut target: T::Target, notes: &str) {
        if self.active.is_some() {
            info!("Stopping the current timer before starting a new one");
            self.stop().await;
        }

        let now = self.clock.time();
        if let Err(e) = self.tracking.on_start(&self.records, &mut target, now).await {
            warn!("Failed to update {target:?} before starting {e:?}");
        }

        let record = self
            .tracking
            .create_record(&target, Uuid::new_v4(), now, notes);
        info!(
            "Started tracking {} as {:?}",
            self.tracking.target_label(&target),
            record.id()
        );
        self.active = Some(ActiveTimer::new(target, record, now, notes.to_string()));
        self.publish();
        self.write_snapshot().await;
    }

    #[instrument(skip_all)]
    pub async fn pause(&mut self) {
        let now = self.clock.time();
        let Some(active) = &mut self.active else {
            debug!("Nothing to pause");
            return;
        };
        if !active.window.pause(now) {
            debug!("Already paused");
            return;
        }
        info!("Paused at {}", format_elapsed(active.window.elapsed_at(now)));
        self.publish();
        self.write_snapshot().await;
    }

    #[instrument(skip_all)]
    pub async fn resume(&mut self) {
        let now = self.clock.time();
        let Some(active) = &mut self.active else {
            debug!("Nothing to resume");
            return;
        };
        if !active.window.resume(now) {
            debug!("Not paused");
            return;
        }
        info!("Resumed at {}", format_elapsed(active.window.elapsed_at(now)));
        self.publish();
        self.write_snapshot().await;
    }

    /// Finalizes and persists the active record. Returns `None` when idle, or when the target
    /// was deleted meanwhile and the record got discarded.
    ///
    /// If persisting fails the record is still returned, and the saved state keeps it paused at
    /// the stop moment so the next process can stop it again.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> Option<T::Record> {
        let Some(mut active) = self.active.take() else {
            debug!("Nothing to stop");
            return None;
        };
        let now = self.clock.time();

        self.tracking.set_notes(&mut active.record, &active.notes);
        self.tracking.finalize(
            &mut active.record,
            now,
            active.window.total_pause_at(now),
            active.interruptions,
        );

        let key = self.tracking.target_key(&active.target);
        let target_exists = match self.tracking.resolve_target(&self.records, &key).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                error!("Couldn't check whether {key:?} still exists, keeping the record {e:?}");
                true
            }
        };

        if !target_exists {
            warn!(
                "Target {key:?} was deleted while tracking, discarding {:?}",
                active.record.id()
            );
            self.publish();
            self.clear_snapshot().await;
            return None;
        }

        let persisted = match self.persist(&active.record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to persist {:?}, keeping it in the saved state {e:?}",
                    active.record.id()
                );
                false
            }
        };
        info!(
            "Stopped {} after {}",
            self.tracking.target_label(&active.target),
            format_elapsed(active.window.elapsed_at(now))
        );
        self.publish();

        if persisted {
            self.clear_snapshot().await;
        } else {
            // Frozen at the stop moment so a later stop saves the same worked time.
            active.window.pause(now);
            let snapshot = ScratchSnapshot::Active(active.snapshot(key));
            if let Err(e) = self.scratch.write(T::SCRATCH_KEY, &snapshot).await {
                error!("Failed to save the unpersisted timer {e:?}");
            }
        }
        Some(active.record)
    }

    /// Replaces the notes of the active timer. Does nothing when idle.
    #[instrument(skip_all)]
    pub async fn update_notes(&mut self, notes: &str) {
        let updated = self
            .update_active(|tracking, active| {
                active.notes = notes.to_string();
                tracking.set_notes(&mut active.record, notes);
            })
            .await;
        if !updated {
            debug!("No active timer to attach notes to");
        }
    }

    /// Brings back the timer that was running when the process last exited.
    ///
    /// Time keeps counting while the process is down unless the timer was paused. A snapshot
    /// that can't be read leaves the engine idle. A snapshot whose target is gone is removed.
    #[instrument(skip_all, fields(kind = T::SCRATCH_KEY))]
    pub async fn restore(&mut self) {
        self.discard_open_records().await;

        if self.active.is_some() {
            debug!("Already tracking, nothing to restore");
            return;
        }

        let snapshot = match self.scratch.read(T::SCRATCH_KEY).await {
            Ok(Some(ScratchSnapshot::Active(snapshot))) => snapshot,
            Ok(Some(ScratchSnapshot::Idle)) | Ok(None) => {
                debug!("No timer to restore");
                return;
            }
            Err(e) => {
                warn!("Ignoring unreadable timer state {e:?}");
                return;
            }
        };

        let target = match self
            .tracking
            .resolve_target(&self.records, &snapshot.target)
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!(
                    "Target {:?} of the saved timer no longer exists, discarding it",
                    snapshot.target
                );
                self.clear_snapshot().await;
                return;
            }
            Err(e) => {
                warn!("Couldn't resolve target of the saved timer {e:?}");
                return;
            }
        };

        self.adopt(target, snapshot);
    }

    /// Follows changes another process made to the saved state of this kind of timer. Nothing
    /// is written back, the other process owns the transition.
    #[instrument(skip_all, fields(kind = T::SCRATCH_KEY))]
    pub async fn sync(&mut self) {
        let saved = match self.scratch.read(T::SCRATCH_KEY).await {
            Ok(Some(ScratchSnapshot::Active(snapshot))) => Some(snapshot),
            Ok(Some(ScratchSnapshot::Idle)) | Ok(None) => None,
            Err(e) => {
                warn!("Keeping the current timer, saved state is unreadable {e:?}");
                return;
            }
        };
        let current = self
            .active
            .as_ref()
            .map(|active| active.snapshot(self.tracking.target_key(&active.target)));
        if saved == current {
            return;
        }

        let Some(snapshot) = saved else {
            info!("Timer was stopped by another process");
            self.active = None;
            self.publish();
            return;
        };
        match self
            .tracking
            .resolve_target(&self.records, &snapshot.target)
            .await
        {
            Ok(Some(target)) => self.adopt(target, snapshot),
            Ok(None) => {
                warn!("Unknown target {:?} in the saved timer", snapshot.target);
                self.active = None;
                self.publish();
            }
            Err(e) => warn!("Couldn't resolve target of the saved timer {e:?}"),
        }
    }

    /// Applies `action` to the active timer and saves the result. Returns false when idle.
    pub(super) async fn update_active(
        &mut self,
        action: impl FnOnce(&T, &mut ActiveTimer<T>),
    ) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };
        action(&self.tracking, active);
        self.publish();
        self.write_snapshot().await;
        true
    }

    pub(super) fn active(&self) -> Option<&ActiveTimer<T>> {
        self.active.as_ref()
    }

    pub(super) fn active_mut(&mut self) -> Option<&mut ActiveTimer<T>> {
        self.active.as_mut()
    }

    /// Records are only written on stop, so an open record in the store is a leftover and
    /// would otherwise be counted forever.
    async fn discard_open_records(&self) {
        let records = match self.records.fetch(Query::<T::Record>::all()).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to look for unfinished records {e:?}");
                return;
            }
        };

        let mut removed = 0;
        for record in records.iter().filter(|record| self.tracking.is_open(record)) {
            warn!("Removing unfinished record {:?}", record.id());
            match self.records.delete::<T::Record>(record.id()).await {
                Ok(_) => removed += 1,
                Err(e) => error!("Failed to remove {:?} {e:?}", record.id()),
            }
        }
        if removed > 0 {
            if let Err(e) = self.records.save().await {
                error!("Failed to save after removing unfinished records {e:?}");
            }
        }
    }

    /// Makes `snapshot` the active timer without writing it back.
    fn adopt(&mut self, target: T::Target, snapshot: ActiveSnapshot) {
        let record = self.tracking.create_record(
            &target,
            snapshot.record_id,
            snapshot.started_at,
            &snapshot.notes,
        );
        let active = ActiveTimer::from_snapshot(target, record, snapshot);
        info!(
            "Loaded {} timer of {} at {}",
            if active.window.is_paused() {
                "paused"
            } else {
                "running"
            },
            self.tracking.target_label(&active.target),
            format_elapsed(active.window.elapsed_at(self.clock.time()))
        );
        self.active = Some(active);
        self.publish();
    }

    async fn clear_snapshot(&self) {
        if let Err(e) = self.scratch.delete(T::SCRATCH_KEY).await {
            error!("Failed to clear saved timer state {e:?}");
        }
    }

    async fn persist(&self, record: &T::Record) -> Result<()> {
        self.records.insert(record.clone()).await?;
        self.records.save().await
    }

    async fn write_snapshot(&self) {
        let snapshot = match &self.active {
            Some(active) => {
                ScratchSnapshot::Active(active.snapshot(self.tracking.target_key(&active.target)))
            }
            None => ScratchSnapshot::Idle,
        };
        if let Err(e) = self.scratch.write(T::SCRATCH_KEY, &snapshot).await {
            error!("Failed to save timer state {e:?}");
        }
    }

    /// Publishes the current state as a new generation and restarts refreshes if running.
    fn publish(&mut self) {
        self.ticker = None;
        self.generation += 1;

        let Some(active) = &self.active else {
            self.status.send_replace(TimerStatus::idle(self.generation));
            return;
        };

        let planned = self.tracking.planned_duration(&active.record);
        self.status.send_replace(TimerStatus {
            phase: active.phase(),
            elapsed: active.window.elapsed_at(self.clock.time()),
            target: Some(self.tracking.target_label(&active.target)),
            planned,
            generation: self.generation,
        });

        if !active.window.is_paused() {
            self.ticker = Some(Ticker::spawn(
                self.clock.clone(),
                self.refresh_interval,
                self.status.clone(),
                self.generation,
                active.window,
                planned,
            ));
        }
    }
}
