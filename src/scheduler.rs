// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::Pipeline;

/// Drive `pipeline` on a fixed interval. The first cycle runs immediately.
/// A slow cycle delays the next tick instead of stacking runs.
pub fn spawn_cycle_scheduler(pipeline: Arc<Pipeline>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = pipeline.run_cycle().await;
            gauge!("pipeline_last_cycle_ts").set(report.started_at.timestamp() as f64);
            tracing::debug!(
                target: "pipeline",
                new_items = report.new_items,
                next_in_secs = interval.as_secs(),
                "scheduled cycle done"
            );
        }
    })
}
