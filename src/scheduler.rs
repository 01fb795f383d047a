//! Background driver for [`SyncClient::flush`].
//!
//! Three triggers feed one flush loop: a cron job, the offline -> online edge
//! of the connectivity signal and [`FlushScheduler::request_flush`]. Triggers
//! that arrive while one is already pending are coalesced, and the loop runs
//! one pass at a time.

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use crate::client::SyncClient;
use crate::config::SchedulerConfig;
use crate::queue::FlushReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    Connectivity,
    Manual,
}

pub struct FlushScheduler {
    scheduler: Mutex<JobScheduler>,
    trigger_tx: mpsc::Sender<FlushTrigger>,
    shutdown_tx: broadcast::Sender<()>,
    report_tx: broadcast::Sender<FlushReport>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    pub async fn start(
        client: SyncClient,
        mut connectivity: watch::Receiver<bool>,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        // edges are measured against the state seen at start
        let online = *connectivity.borrow_and_update();
        // one slot: a pending trigger absorbs any that follow it
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (report_tx, _) = broadcast::channel(16);

        let scheduler = JobScheduler::new().await?;
        let schedule = config.flush_schedule.clone();
        let timer_tx = trigger_tx.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let tx = timer_tx.clone();
            Box::pin(async move {
                let _ = tx.try_send(FlushTrigger::Timer);
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(schedule = %schedule, "flush scheduler started");

        let handle = tokio::spawn(run_flush_loop(
            client,
            trigger_rx,
            connectivity,
            online,
            shutdown_rx,
            report_tx.clone(),
        ));

        Ok(Self {
            scheduler: Mutex::new(scheduler),
            trigger_tx,
            shutdown_tx,
            report_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Asks for a flush pass soon. Returns `false` if a pass was already
    /// pending or the scheduler is stopped.
    pub fn request_flush(&self) -> bool {
        self.trigger_tx.try_send(FlushTrigger::Manual).is_ok()
    }

    /// Reports of every pass run from now on.
    pub fn reports(&self) -> broadcast::Receiver<FlushReport> {
        self.report_tx.subscribe()
    }

    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(err) = scheduler.shutdown().await {
            warn!(error = %err, "error shutting down flush scheduler");
        }

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "flush loop ended abnormally");
            }
            info!("flush scheduler stopped");
        }
    }
}

async fn run_flush_loop(
    client: SyncClient,
    mut triggers: mpsc::Receiver<FlushTrigger>,
    mut connectivity: watch::Receiver<bool>,
    mut online: bool,
    mut shutdown: broadcast::Receiver<()>,
    reports: broadcast::Sender<FlushReport>,
) {
    let mut watching = true;

    loop {
        let trigger = tokio::select! {
            _ = shutdown.recv() => break,
            Some(trigger) = triggers.recv() => trigger,
            changed = connectivity.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let was_online = online;
                online = *connectivity.borrow_and_update();
                if online && !was_online {
                    FlushTrigger::Connectivity
                } else {
                    continue;
                }
            }
            else => break,
        };

        if trigger == FlushTrigger::Timer && !online {
            debug!("offline, skipping timed flush");
            continue;
        }

        let report = client.flush().await;
        debug!(?trigger, sent = report.sent, remaining = report.remaining, "flush pass finished");
        let _ = reports.send(report);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}
