//! Durable pipeline driver: claims one queued job, runs its stage, and records the outcome.
//!
//! Stages are `SCORE -> ASSIGN -> SYNTHESIZE`. Each stage enqueues its successor in the same
//! transaction as its own write, so a crash between stages loses nothing.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{CairnService, Error, Result};
use cairn_domain::status::{JobStatus, Stage};
use cairn_storage::{models::PipelineJob, queue};

const MAX_JOB_ERROR_CHARS: usize = 1_024;
const ELLIPSIS: &str = "...";

/// Outcome of one claimed job.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobRun {
	pub job_id: Uuid,
	pub dedupe_key: String,
	pub status: JobStatus,
	pub attempts: i32,
}

impl CairnService {
	/// Claims and runs the next runnable job. Returns `None` when nothing is runnable.
	pub async fn run_next_job(&self) -> Result<Option<JobRun>> {
		let pipeline = &self.cfg.pipeline;
		let now = OffsetDateTime::now_utc();
		let Some(job) = queue::claim_next(&self.db, now, pipeline.claim_lease_seconds).await?
		else {
			return Ok(None);
		};
		let stage = Stage::parse(&job.stage);
		let result = match &stage {
			Ok(stage) => self.run_stage(*stage, &job).await,
			Err(err) => Err(Error::InvalidRequest { message: err.to_string() }),
		};
		let attempts = job.attempts.saturating_add(1);
		let finished_at = OffsetDateTime::now_utc();
		let err = match result {
			Ok(()) => {
				queue::mark_done(&self.db, job.job_id, finished_at).await?;

				tracing::debug!(job_id = %job.job_id, dedupe_key = %job.dedupe_key, "Job done.");

				return Ok(Some(JobRun {
					job_id: job.job_id,
					dedupe_key: job.dedupe_key,
					status: JobStatus::Done,
					attempts,
				}));
			},
			Err(err) => err,
		};
		let error_text = sanitize_error(&err.to_string());
		let max_attempts = match stage {
			Ok(Stage::Score) => pipeline.score_max_attempts,
			Ok(Stage::Assign) => pipeline.assign_max_attempts,
			Ok(Stage::Synthesize) => pipeline.synthesis_max_attempts,
			Err(_) => 1,
		};
		let exhausted = !err.is_retryable() || attempts >= max_attempts;

		if let (Ok(Stage::Score), Some(note_id)) = (&stage, job.note_id)
			&& let Err(record_err) =
				self.record_scoring_failure(note_id, &error_text, exhausted).await
		{
			tracing::error!(
				error = %record_err,
				note_id = %note_id,
				"Failed to record scoring failure."
			);
		}

		let status = if exhausted {
			queue::mark_dead(&self.db, job.job_id, attempts, &error_text, finished_at).await?;

			tracing::error!(
				job_id = %job.job_id,
				dedupe_key = %job.dedupe_key,
				attempts,
				error = %error_text,
				"Job dead-lettered."
			);

			JobStatus::Dead
		} else {
			let available_at = finished_at
				+ backoff_for_attempt(attempts, pipeline.base_backoff_ms, pipeline.max_backoff_ms);

			queue::mark_failed(&self.db, job.job_id, attempts, &error_text, available_at, finished_at)
				.await?;

			tracing::warn!(
				job_id = %job.job_id,
				dedupe_key = %job.dedupe_key,
				attempts,
				error = %error_text,
				"Job failed. Retrying with backoff."
			);

			JobStatus::Failed
		};

		Ok(Some(JobRun { job_id: job.job_id, dedupe_key: job.dedupe_key, status, attempts }))
	}

	/// Deletes DONE jobs older than `pipeline.purge_done_after_hours`. DEAD jobs are kept.
	pub async fn purge_finished_jobs(&self, now: OffsetDateTime) -> Result<u64> {
		let before = now - Duration::hours(self.cfg.pipeline.purge_done_after_hours);
		let purged = queue::purge_done(&self.db, before).await?;

		if purged > 0 {
			tracing::info!(purged, "Purged finished pipeline jobs.");
		}

		Ok(purged)
	}

	async fn run_stage(&self, stage: Stage, job: &PipelineJob) -> Result<()> {
		match stage {
			Stage::Score => self.score_note(required(job.note_id, "note_id", job)?).await,
			Stage::Assign =>
				self.assign_note(required(job.note_id, "note_id", job)?).await.map(|_| ()),
			Stage::Synthesize => {
				let cluster_id = required(job.cluster_id, "cluster_id", job)?;
				let revision = required(job.revision, "revision", job)?;

				self.synthesize_cluster(cluster_id, revision).await.map(|_| ())
			},
		}
	}
}

/// Retry delay after `attempt` failures: `base * 2^(attempt - 1)`, exponent capped at 6 and
/// the result capped at `max_ms`.
pub fn backoff_for_attempt(attempt: i32, base_ms: i64, max_ms: i64) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = base_ms.saturating_mul(1 << exp);
	let capped = base.min(max_ms);

	Duration::milliseconds(capped)
}

/// Redacts credentials from an error message and truncates it for storage.
pub fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_JOB_ERROR_CHARS {
		out = out.chars().take(MAX_JOB_ERROR_CHARS - ELLIPSIS.len()).collect();
		out.push_str(ELLIPSIS);
	}

	out
}

fn required<T>(value: Option<T>, field: &str, job: &PipelineJob) -> Result<T> {
	value.ok_or_else(|| Error::InvalidRequest {
		message: format!("Job {} is missing {field}.", job.dedupe_key),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_then_caps() {
		assert_eq!(backoff_for_attempt(0, 500, 30_000), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(1, 500, 30_000), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(3, 500, 30_000), Duration::milliseconds(2_000));
		assert_eq!(backoff_for_attempt(7, 500, 60_000), Duration::milliseconds(32_000));
		assert_eq!(backoff_for_attempt(50, 500, 60_000), Duration::milliseconds(32_000));
		assert_eq!(backoff_for_attempt(7, 500, 30_000), Duration::milliseconds(30_000));
	}

	#[test]
	fn secrets_are_redacted() {
		let text = sanitize_error("401 from provider: Bearer sk-live-123 api_key=abc token:xyz ok");

		assert_eq!(
			text,
			"401 from provider: Bearer [REDACTED] api_key=[REDACTED] token:[REDACTED] ok"
		);
	}

	#[test]
	fn long_errors_are_truncated() {
		let text = sanitize_error(&"x".repeat(MAX_JOB_ERROR_CHARS * 2));

		assert_eq!(text.chars().count(), MAX_JOB_ERROR_CHARS);
		assert!(text.ends_with("..."));
	}

	#[test]
	fn errors_at_the_limit_are_kept_whole() {
		let exact = "é".repeat(MAX_JOB_ERROR_CHARS);

		assert_eq!(sanitize_error(&exact), exact);
	}
}
