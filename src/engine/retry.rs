//! Scheduled reassignment jobs.
//!
//! One row per order id; scheduling again for the same order replaces the
//! row. A worker polls for due rows, and every committed transition drops a
//! row whose `expected_status` no longer matches the order.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use prometheus::IntGauge;
use serde::Serialize;
use tokio::time::{Duration as TokioDuration, interval};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::lifecycle;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    RiderAssignment,
    VendorReassignment,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRetry {
    pub order_id: Uuid,
    pub kind: RetryKind,
    pub attempt: u32,
    pub max_attempts: u32,
    pub due_at: DateTime<Utc>,
    pub expected_status: OrderStatus,
}

impl ScheduledRetry {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

pub struct RetryTable {
    jobs: DashMap<Uuid, ScheduledRetry>,
    gauge: IntGauge,
}

impl RetryTable {
    pub fn new(gauge: IntGauge) -> Self {
        Self {
            jobs: DashMap::new(),
            gauge,
        }
    }

    pub fn schedule(&self, job: ScheduledRetry) {
        debug!(
            order_id = %job.order_id,
            kind = ?job.kind,
            attempt = job.attempt,
            due_at = %job.due_at,
            "retry scheduled"
        );
        self.jobs.insert(job.order_id, job);
        self.sync_gauge();
    }

    pub fn cancel(&self, order_id: Uuid) -> Option<ScheduledRetry> {
        let removed = self.jobs.remove(&order_id).map(|(_, job)| job);
        self.sync_gauge();
        removed
    }

    /// Drops the job for `order_id` if the order is no longer in the state
    /// the job was scheduled for.
    pub fn discard_stale(&self, order_id: Uuid, current: OrderStatus) {
        if self
            .jobs
            .remove_if(&order_id, |_, job| job.expected_status != current)
            .is_some()
        {
            debug!(order_id = %order_id, status = ?current, "stale retry discarded");
            self.sync_gauge();
        }
    }

    pub fn get(&self, order_id: Uuid) -> Option<ScheduledRetry> {
        self.jobs.get(&order_id).map(|job| job.value().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Removes and returns every job due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledRetry> {
        let due_ids: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().due_at <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut due: Vec<ScheduledRetry> = due_ids
            .into_iter()
            .filter_map(|id| self.jobs.remove_if(&id, |_, job| job.due_at <= now))
            .map(|(_, job)| job)
            .collect();
        due.sort_by_key(|job| (job.due_at, job.order_id));

        self.sync_gauge();
        due
    }

    fn sync_gauge(&self) {
        self.gauge.set(self.jobs.len() as i64);
    }
}

/// Delay before attempt `attempt` (1-based): the base reassignment delay
/// multiplied by the backoff factor per previous attempt, capped.
pub fn backoff_delay(config: &DispatchConfig, attempt: u32) -> Duration {
    let base = config.reassign_delay_secs;
    let factor = u64::from(config.rider_retry_backoff_factor.max(1));
    let exponent = attempt.saturating_sub(1);

    let secs = factor
        .checked_pow(exponent)
        .and_then(|multiplier| base.checked_mul(multiplier))
        .unwrap_or(config.retry_max_delay_secs)
        .min(config.retry_max_delay_secs)
        .min(u64::from(u32::MAX));

    Duration::seconds(secs as i64)
}

/// Runs every due job once. Returns how many jobs were processed.
pub fn process_due_retries(state: &AppState, now: DateTime<Utc>) -> usize {
    let due = state.retries.take_due(now);
    let count = due.len();

    for job in due {
        match lifecycle::run_retry(state, &job, now) {
            Ok(outcome) => {
                info!(
                    order_id = %job.order_id,
                    kind = ?job.kind,
                    outcome = ?outcome,
                    "retry processed"
                )
            }
            Err(err) => {
                error!(order_id = %job.order_id, kind = ?job.kind, error = %err, "retry failed")
            }
        }
    }

    count
}

pub async fn run_retry_worker(state: Arc<AppState>) {
    let poll = TokioDuration::from_millis(state.config.dispatch.retry_poll_interval_ms.max(10));
    let mut ticker = interval(poll);

    info!(poll_ms = poll.as_millis() as u64, "retry worker started");

    loop {
        ticker.tick().await;
        if state.retries.is_empty() {
            continue;
        }
        process_due_retries(&state, Utc::now());
    }
}
