//! Supervised periodic background loops.

pub mod dispatch_job;
pub mod scrape_job;
pub mod taxonomy_refresh_job;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use log::debug;
use log::error;
use log::info;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::panic_message;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Body of a periodic loop.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one tick. `tick` counts from 0 for the first run after the start offset.
    async fn run_once(&self, tick: u64, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// Runs a [`PeriodicJob`] on a fixed interval until cancelled.
///
/// A tick that outlasts the interval delays the next one instead of overlapping it. Errors
/// and panics of a tick are logged and the loop continues with the next tick.
pub struct PeriodicTask {
    job: Arc<dyn PeriodicJob>,
    interval: Duration,
    start_offset: Duration,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl PeriodicTask {
    /// Creates a task stopped by `stop` or by cancelling `parent`.
    pub fn new(
        job: Arc<dyn PeriodicJob>,
        interval: Duration,
        start_offset: Duration,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        info!(
            "Initializing {} with interval {:?} and start offset {:?}",
            job.name(),
            interval,
            start_offset
        );
        Arc::new(Self {
            job,
            interval: interval.max(MIN_INTERVAL),
            start_offset,
            running: AtomicBool::new(false),
            cancel: parent.child_token(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the loop. Returns `None` when it is already running.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        info!("Starting {} loop.", self.name());
        Some(self.spawn_loop())
    }

    /// Stops the loop after the current tick.
    pub fn stop(&self) {
        info!("Stopping {} loop.", self.name());
        self.cancel.cancel();
    }

    fn spawn_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
                _ = tokio::time::sleep(self.start_offset) => {}
            }

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0u64;

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                self.run_tick(tick).await;
                tick += 1;
            }

            self.running.store(false, Ordering::SeqCst);
            info!("Stopped {} loop.", self.name());
        })
    }

    async fn run_tick(&self, tick: u64) {
        let name = self.name();
        let started = Instant::now();
        debug!("{} tick {} started.", name, tick);

        match AssertUnwindSafe(self.job.run_once(tick, &self.cancel))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => debug!(
                "{} tick {} finished ({:.2}s).",
                name,
                tick,
                started.elapsed().as_secs_f64()
            ),
            Ok(Err(e)) => error!("{} tick {} failed: {:#}", name, tick, e),
            Err(panic) => error!(
                "{} tick {} panicked: {}",
                name,
                tick,
                panic_message(panic.as_ref())
            ),
        }
    }
}
