use std::{path::Path, sync::Arc};

use anyhow::Result;
use tracing::debug;

use crate::{
    config::Config,
    storage::{
        record_storage::JsonRecordStore,
        scratch::{FileScratchStore, ScratchStore},
    },
    timer::{billable::Billable, engine::TimerEngine, focus::Focus},
    utils::clock::Clock,
};

pub type Records = Arc<JsonRecordStore>;

pub const RECORDS_DIR: &str = "records";
pub const SCRATCH_FILE: &str = "scratch.json";

/// Everything a command needs, wired together over one application directory. Both timers are
/// restored while opening.
pub struct App {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub records: Records,
    pub billable: TimerEngine<Billable, Records>,
    pub focus: TimerEngine<Focus, Records>,
}

impl App {
    pub async fn open(application_dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let config = Config::load(application_dir)?;
        debug!("Opening {application_dir:?} with {config:?}");

        let records = Arc::new(JsonRecordStore::new(application_dir.join(RECORDS_DIR))?);
        let scratch: Arc<dyn ScratchStore> =
            Arc::new(FileScratchStore::new(application_dir.join(SCRATCH_FILE)));

        let mut billable = TimerEngine::new(
            Billable,
            records.clone(),
            scratch.clone(),
            clock.clone(),
            config.refresh_interval(),
        );
        let mut focus = TimerEngine::new(
            Focus,
            records.clone(),
            scratch,
            clock.clone(),
            config.refresh_interval(),
        );
        billable.restore().await;
        focus.restore().await;

        Ok(Self {
            config,
            clock,
            records,
            billable,
            focus,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Duration;
    use tempfile::tempdir;

    use crate::{
        storage::{
            entities::{Project, SessionType, TaskCategory},
            record_storage::RecordStore,
        },
        timer::focus::FocusTarget,
        utils::clock::{testing::ManualClock, Clock},
    };

    use super::App;

    #[tokio::test]
    async fn test_both_timers_survive_reopening() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        {
            let mut app = App::open(dir.path(), Arc::new(clock.clone())).await?;
            let project = Project::new("Website".into(), 100., None, clock.time());
            app.records.insert(project.clone()).await?;
            app.records.save().await?;

            app.billable.start(project, "copy").await;
            app.focus
                .start(FocusTarget::new(SessionType::Sprint, TaskCategory::Content), "")
                .await;
            clock.advance(Duration::minutes(4));
            app.focus.pause().await;
        }

        clock.advance(Duration::minutes(10));
        let app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        assert_eq!(app.billable.elapsed_time(), Duration::minutes(14));
        assert_eq!(app.billable.current_notes(), "copy");
        assert!(app.focus.is_paused());
        assert_eq!(app.focus.elapsed_time(), Duration::minutes(4));
        Ok(())
    }
}
