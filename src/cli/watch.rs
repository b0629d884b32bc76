use std::{io::Write, time::Duration};

use ansi_term::Colour;
use anyhow::Result;
use futures::StreamExt;
use tokio::{select, time::MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::{
    storage::record_storage::RecordStore,
    timer::{
        engine::TimerEngine,
        state::{TimerPhase, TimerStatus},
        tracking::Tracking,
    },
    utils::time::format_elapsed,
};

/// Cancels `cancelation` once the user presses Ctrl-C.
pub async fn detect_interrupt(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
    };
}

pub fn phase_badge(phase: TimerPhase) -> String {
    match phase {
        TimerPhase::Idle => Colour::Fixed(244).paint("idle").to_string(),
        TimerPhase::Running => Colour::Green.bold().paint("running").to_string(),
        TimerPhase::Paused => Colour::Yellow.bold().paint("paused").to_string(),
    }
}

pub fn status_line(status: &TimerStatus) -> String {
    match status.phase {
        TimerPhase::Idle => format!("{}\tNot tracking", phase_badge(status.phase)),
        phase => format!(
            "{}\t{}\t{}",
            phase_badge(phase),
            format_elapsed(status.elapsed),
            status.target.as_deref().unwrap_or_default()
        ),
    }
}

/// Redraws one line of `output` on every status update until the timer goes idle or `cancel`
/// fires. Every `sync_interval` the engine re-reads the saved state, so transitions made by
/// other processes show up too.
pub async fn watch_status<T: Tracking, S: RecordStore>(
    engine: &mut TimerEngine<T, S>,
    cancel: CancellationToken,
    sync_interval: Duration,
    output: &mut impl Write,
    mut render: impl FnMut(&TimerStatus) -> String,
) -> Result<()> {
    let mut updates = WatchStream::new(engine.subscribe());
    let mut sync = tokio::time::interval(sync_interval);
    sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = sync.tick() => engine.sync().await,
            update = updates.next() => {
                let Some(status) = update else {
                    break;
                };
                write!(output, "\r\x1b[2K{}", render(&status))?;
                output.flush()?;
                if status.phase == TimerPhase::Idle {
                    break;
                }
            }
        }
    }
    writeln!(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use anyhow::Result;
    use chrono::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio_util::sync::CancellationToken;

    use crate::{
        app::App,
        storage::{entities::Project, record_storage::RecordStore},
        timer::state::{TimerPhase, TimerStatus},
        utils::clock::{testing::ManualClock, Clock},
    };

    use super::{status_line, watch_status};

    fn running(seconds: i64) -> TimerStatus {
        TimerStatus {
            phase: TimerPhase::Running,
            elapsed: Duration::seconds(seconds),
            target: Some("Website".into()),
            planned: None,
            generation: 1,
        }
    }

    /// Directory with a billable timer that was started by an earlier process.
    async fn running_timer(clock: &ManualClock) -> Result<TempDir> {
        let dir = tempdir()?;
        let mut app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let project = Project::new("Website".into(), 120., None, clock.time());
        app.records.insert(project.clone()).await?;
        app.records.save().await?;
        app.billable.start(project, "").await;
        Ok(dir)
    }

    #[test]
    fn test_status_line() {
        let line = status_line(&running(240));
        assert!(line.contains("4:00"));
        assert!(line.ends_with("Website"));
        assert!(status_line(&TimerStatus::idle(3)).contains("Not tracking"));
    }

    #[tokio::test]
    async fn test_watch_ends_when_stopped_by_another_process() -> Result<()> {
        let clock = ManualClock::new();
        let dir = running_timer(&clock).await?;
        let mut watcher = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let mut other = App::open(dir.path(), Arc::new(clock.clone())).await?;
        assert!(watcher.billable.is_tracking());

        clock.advance(Duration::minutes(30));
        let mut output = Vec::new();
        let (result, _) = tokio::join!(
            tokio::time::timeout(
                StdDuration::from_secs(5),
                watch_status(
                    &mut watcher.billable,
                    CancellationToken::new(),
                    StdDuration::from_millis(20),
                    &mut output,
                    status_line,
                )
            ),
            async {
                tokio::time::sleep(StdDuration::from_millis(100)).await;
                other.billable.stop().await;
            }
        );
        result??;

        assert_eq!(watcher.billable.phase(), TimerPhase::Idle);
        let output = String::from_utf8(output)?;
        assert!(output.contains("running"));
        assert!(output.trim_end().ends_with("Not tracking"));
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_shows_pause_from_another_process() -> Result<()> {
        let clock = ManualClock::new();
        let dir = running_timer(&clock).await?;
        let mut watcher = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let mut other = App::open(dir.path(), Arc::new(clock.clone())).await?;

        clock.advance(Duration::minutes(5));
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let mut output = Vec::new();
        let (result, _) = tokio::join!(
            tokio::time::timeout(
                StdDuration::from_secs(5),
                watch_status(
                    &mut watcher.billable,
                    cancel.clone(),
                    StdDuration::from_millis(20),
                    &mut output,
                    |status| {
                        seen.push(status.phase);
                        if status.phase == TimerPhase::Paused {
                            cancel.cancel();
                        }
                        status_line(status)
                    },
                )
            ),
            async {
                tokio::time::sleep(StdDuration::from_millis(100)).await;
                other.billable.pause().await;
            }
        );
        result??;

        assert_eq!(seen.first(), Some(&TimerPhase::Running));
        assert_eq!(seen.last(), Some(&TimerPhase::Paused));
        assert!(watcher.billable.is_paused());
        assert_eq!(watcher.billable.elapsed_time(), Duration::minutes(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() -> Result<()> {
        let clock = ManualClock::new();
        let dir = running_timer(&clock).await?;
        let mut app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut output = Vec::new();
        watch_status(
            &mut app.billable,
            cancel,
            StdDuration::from_secs(1),
            &mut output,
            |_| String::new(),
        )
        .await?;
        assert!(String::from_utf8(output)?.ends_with('\n'));
        assert!(app.billable.is_tracking());
        Ok(())
    }
}
