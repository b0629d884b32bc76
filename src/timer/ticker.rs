use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::{clock::Clock, time::format_elapsed};

use super::state::{TimeWindow, TimerPhase, TimerStatus};

/// Periodic elapsed time refresh of a running timer. The task is cancelled when the ticker is
/// dropped.
pub struct Ticker {
    token: CancellationToken,
}

impl Ticker {
    /// Starts refreshing `status` every `interval`. Only statuses of `generation` are updated,
    /// so a ticker that outlived its transition can't overwrite newer state.
    pub fn spawn(
        clock: Arc<dyn Clock>,
        interval: Duration,
        status: Arc<watch::Sender<TimerStatus>>,
        generation: u64,
        window: TimeWindow,
        planned: Option<chrono::Duration>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut announced =
                planned.is_some_and(|planned| window.elapsed_at(clock.time()) >= planned);
            let mut refresh_point = clock.instant();
            loop {
                refresh_point += interval;
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Ticker for generation {generation} cancelled");
                        return;
                    }
                    _ = clock.sleep_until(refresh_point) => ()
                }

                let elapsed = window.elapsed_at(clock.time());
                let published = status.send_if_modified(|current| {
                    if current.generation != generation || current.phase != TimerPhase::Running {
                        return false;
                    }
                    current.elapsed = elapsed;
                    true
                });
                if !published {
                    debug!("Ticker for generation {generation} is stale, stopping");
                    return;
                }

                if let Some(planned) = planned.filter(|planned| !announced && elapsed >= *planned) {
                    announced = true;
                    info!("Planned duration of {} reached", format_elapsed(planned));
                }
            }
        });

        Self { token }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
