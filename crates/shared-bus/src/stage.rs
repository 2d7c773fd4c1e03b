//! # Supervised Pipeline Stages
//!
//! Each stage is a perpetual consumer of its own queue. Failures are contained
//! at the item boundary: an `Err` or a panic while handling one item is logged,
//! the stage sleeps for the backoff, then continues with the next item. The
//! loop only ends when every sender of its queue is gone.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Unexpected failure inside a stage.
///
/// Protocol-level problems (bad signatures, wrong phase) are handled inside the
/// stage and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    /// A downstream queue is gone.
    #[error("Queue {0} closed")]
    QueueClosed(&'static str),

    /// Anything else the stage could not recover from for this item.
    #[error("{0}")]
    Internal(String),
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send {
    /// Queue item type.
    type Item: Send + 'static;

    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Handle a single item.
    async fn process(&mut self, item: Self::Item) -> Result<(), StageError>;
}

/// Counters returned when a stage loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub processed: u64,
    pub failed: u64,
}

/// Run `stage` over `queue` until the queue closes.
pub async fn supervise<S: Stage>(
    mut stage: S,
    mut queue: mpsc::Receiver<S::Item>,
    backoff: Duration,
) -> StageReport {
    let name = stage.name();
    let mut report = StageReport::default();
    info!(stage = name, "Stage started");

    while let Some(item) = queue.recv().await {
        if !run_item(&mut stage, item, backoff, &mut report).await {
            debug!(stage = name, "Stage resumed after backoff");
        }
    }

    info!(
        stage = name,
        processed = report.processed,
        failed = report.failed,
        "Stage stopped (queue closed)"
    );
    report
}

/// Run `stage` once per `period`, feeding it the tick instant.
///
/// Never returns; abort the owning task to stop it.
pub async fn supervise_interval<S: Stage<Item = Instant>>(
    mut stage: S,
    period: Duration,
    backoff: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut report = StageReport::default();
    info!(stage = stage.name(), period_ms = period.as_millis() as u64, "Periodic stage started");

    loop {
        let tick = ticker.tick().await;
        run_item(&mut stage, tick, backoff, &mut report).await;
    }
}

/// Returns `true` when the item was handled cleanly.
async fn run_item<S: Stage>(
    stage: &mut S,
    item: S::Item,
    backoff: Duration,
    report: &mut StageReport,
) -> bool {
    let name = stage.name();
    let outcome = AssertUnwindSafe(stage.process(item)).catch_unwind().await;
    report.processed += 1;

    let failure = match outcome {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    report.failed += 1;
    error!(
        stage = name,
        error = %failure,
        failed = report.failed,
        backoff_ms = backoff.as_millis() as u64,
        "Stage fault, restarting after backoff"
    );
    tokio::time::sleep(backoff).await;
    false
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
