//! Pipeline lanes plus the periodic maintenance loop.
//!
//! Every lane claims jobs from the shared Postgres queue, so lanes and worker processes can be
//! added freely. Maintenance covers the time-floor sweep, queue purge and retention.

use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::{task::JoinSet, time as tokio_time};

use crate::Result;
use cairn_service::CairnService;

const MAINTENANCE_TICK_MS: i64 = 1_000;
const PURGE_INTERVAL_SECONDS: i64 = 900;

pub async fn run_worker(service: Arc<CairnService>) -> Result<()> {
	let lanes = service.cfg.pipeline.concurrency.max(1);
	let mut tasks = JoinSet::new();

	for lane in 0..lanes {
		tasks.spawn(run_lane(service.clone(), lane));
	}

	tasks.spawn(run_maintenance(service));

	tracing::info!(lanes, "Worker started.");

	while let Some(joined) = tasks.join_next().await {
		joined??;
	}

	Ok(())
}

async fn run_lane(service: Arc<CairnService>, lane: u32) -> Result<()> {
	let idle = to_std_duration(Duration::milliseconds(
		i64::try_from(service.cfg.pipeline.poll_interval_ms).unwrap_or(i64::MAX),
	));

	loop {
		match service.run_next_job().await {
			Ok(Some(_)) => continue,
			Ok(None) => {},
			Err(err) => {
				tracing::error!(lane, error = %err, "Pipeline job processing failed.");
			},
		}

		tokio_time::sleep(idle).await;
	}
}

async fn run_maintenance(service: Arc<CairnService>) -> Result<()> {
	let sweep_every = seconds(service.cfg.snapshots.sweep_interval_seconds);
	let retention_every = seconds(service.cfg.retention.interval_seconds);
	let purge_every = Duration::seconds(PURGE_INTERVAL_SECONDS);
	let started = OffsetDateTime::now_utc();
	let mut last_sweep = started;
	let mut last_purge = started;
	let mut last_retention = started;

	loop {
		let now = OffsetDateTime::now_utc();

		// A failed pass waits a full interval like a successful one.
		if is_due(last_sweep, sweep_every, now) {
			last_sweep = now;

			match service.sweep_time_floor(now).await {
				Ok(report) if report.captured > 0 => tracing::info!(
					examined = report.examined,
					captured = report.captured,
					"Time-floor sweep captured snapshots."
				),
				Ok(_) => {},
				Err(err) => tracing::error!(error = %err, "Time-floor sweep failed."),
			}
		}
		if is_due(last_purge, purge_every, now) {
			last_purge = now;

			if let Err(err) = service.purge_finished_jobs(now).await {
				tracing::error!(error = %err, "Pipeline job purge failed.");
			}
		}
		if service.cfg.retention.enabled && is_due(last_retention, retention_every, now) {
			last_retention = now;

			if let Err(err) = service.apply_retention(now).await {
				tracing::error!(error = %err, "Retention pass failed.");
			}
		}

		tokio_time::sleep(to_std_duration(Duration::milliseconds(MAINTENANCE_TICK_MS))).await;
	}
}

fn is_due(last: OffsetDateTime, every: Duration, now: OffsetDateTime) -> bool {
	now - last >= every
}

fn seconds(value: u64) -> Duration {
	Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

fn to_std_duration(duration: Duration) -> StdDuration {
	let millis = duration.whole_milliseconds();

	if millis <= 0 {
		return StdDuration::from_millis(0);
	}

	StdDuration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tasks_become_due_once_their_interval_elapses() {
		let last = OffsetDateTime::UNIX_EPOCH;
		let every = Duration::seconds(300);

		assert!(!is_due(last, every, last + Duration::seconds(299)));
		assert!(is_due(last, every, last + Duration::seconds(300)));
	}

	#[test]
	fn negative_durations_clamp_to_zero() {
		assert_eq!(to_std_duration(Duration::milliseconds(-5)), StdDuration::ZERO);
		assert_eq!(to_std_duration(Duration::milliseconds(1_500)), StdDuration::from_millis(1_500));
	}
}
