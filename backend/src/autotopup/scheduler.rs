// Auto-top-up scheduler
//
// Fires the worker every `period` (5 minutes by default). The first cycle
// runs one period after start, not immediately. Ticks missed while a cycle
// is still running are skipped rather than bunched up.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::worker::{CycleStatus, TopUpWorker};

pub struct TopUpScheduler {
    worker: Arc<TopUpWorker>,
    period: Duration,
}

impl TopUpScheduler {
    pub fn new(worker: Arc<TopUpWorker>, period: Duration) -> Self {
        Self { worker, period }
    }

    /// Start the scheduler loop (runs in background until the worker's
    /// shutdown signal fires)
    pub fn start(&self) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let period = self.period;

        tokio::spawn(async move {
            let mut shutdown = worker.subscribe_shutdown();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!("⏰ Auto-top-up scheduler started (every {:?})", period);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        match worker.run_once().await {
                            CycleStatus::Skipped => debug!("Scheduled cycle skipped, previous still running"),
                            status => debug!("Scheduled cycle finished: {:?}", status),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!("🛑 Auto-top-up scheduler stopped");
        })
    }
}
