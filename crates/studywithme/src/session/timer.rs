//! Per-question countdown.
//!
//! A `QuizTimer` is owned by the active quiz; dropping it stops the ticks,
//! so every path that ends the quiz also ends the countdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::controller::SessionController;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct QuizTimer {
    run_id: u64,
    handle: JoinHandle<()>,
}

impl QuizTimer {
    pub(crate) fn start(controller: &SessionController, run_id: u64, period: Duration) -> Self {
        let weak = Arc::downgrade(controller.inner());
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(controller) = SessionController::upgrade(&weak) else {
                    break;
                };
                if !controller.is_current_run(run_id).await {
                    break;
                }
                // A tick may auto-submit, which can end the quiz and drop this
                // timer; run it outside the timer task.
                tokio::spawn(async move {
                    controller.tick_run(Some(run_id)).await;
                });
            }
            debug!("Quiz timer loop for run {} exited", run_id);
        });
        debug!("Quiz timer started for run {}", run_id);
        Self { run_id, handle }
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Quiz timer cancelled for run {}", self.run_id);
    }
}
