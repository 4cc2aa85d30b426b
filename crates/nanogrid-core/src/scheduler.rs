//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Periodic poll cycle scheduling and shutdown."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cycle::{CycleReport, PollCycle};

/// Runs a [`PollCycle`] on a fixed interval until shut down.
pub struct PollScheduler;

impl PollScheduler {
    /// Spawn the polling loop. The first cycle starts immediately.
    pub fn spawn(cycle: Arc<PollCycle>, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (report_tx, report_rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs_f64(), mode = ?cycle.mode(), "poll scheduler started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("poll scheduler shutdown");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = cycle.run().await;
                        let _ = report_tx.send(Some(report));
                    }
                }
            }
        });

        SchedulerHandle {
            task,
            shutdown: shutdown_tx,
            reports: report_rx,
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    reports: watch::Receiver<Option<CycleReport>>,
}

impl SchedulerHandle {
    /// Receiver yielding the most recent cycle report.
    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.clone()
    }

    /// Stop after the in-flight cycle, if any, and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(anyhow::Error::new)
    }
}
