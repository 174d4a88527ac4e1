//! Durable pipeline queue. Each job is one typed stage run, deduplicated by key.

use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::PipelineJob};

const JOB_COLUMNS: &str = "\
	job_id,
	stage,
	dedupe_key,
	org_id,
	note_id,
	cluster_id,
	revision,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at";

#[derive(Debug)]
pub struct NewJob<'a> {
	pub stage: &'a str,
	pub dedupe_key: &'a str,
	pub org_id: Uuid,
	pub note_id: Option<Uuid>,
	pub cluster_id: Option<Uuid>,
	pub revision: Option<i64>,
	pub available_at: OffsetDateTime,
}

/// Enqueues a job. Returns `false` when a job with the same dedupe key already exists.
pub async fn enqueue<'e, E>(executor: E, job: &NewJob<'_>) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO pipeline_jobs (
	job_id,
	stage,
	dedupe_key,
	org_id,
	note_id,
	cluster_id,
	revision,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', 0, $8, $8, $8)
ON CONFLICT (dedupe_key) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(job.stage)
	.bind(job.dedupe_key)
	.bind(job.org_id)
	.bind(job.note_id)
	.bind(job.cluster_id)
	.bind(job.revision)
	.bind(job.available_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Claims the oldest runnable job and leases it by pushing `available_at` forward.
///
/// Jobs whose lease expired without a result become claimable again, which gives
/// at-least-once delivery.
pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<PipelineJob>> {
	let mut tx = db.pool.begin().await?;
	let sql = format!(
		"\
SELECT {JOB_COLUMNS}
FROM pipeline_jobs
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC, created_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
	);
	let row = sqlx::query_as::<_, PipelineJob>(&sql).bind(now).fetch_optional(&mut *tx).await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query("UPDATE pipeline_jobs SET available_at = $1, updated_at = $2 WHERE job_id = $3")
			.bind(lease_until)
			.bind(now)
			.bind(job.job_id)
			.execute(&mut *tx)
			.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_done(db: &Db, job_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"UPDATE pipeline_jobs SET status = 'DONE', last_error = NULL, updated_at = $1 WHERE job_id = $2",
	)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_failed(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE pipeline_jobs
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE job_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Dead-letters a job. It stays in the table for operator inspection.
pub async fn mark_dead(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE pipeline_jobs
SET status = 'DEAD',
	attempts = $1,
	last_error = $2,
	updated_at = $3
WHERE job_id = $4",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Deletes DONE jobs last touched before `before`. Returns the number removed.
pub async fn purge_done(db: &Db, before: OffsetDateTime) -> Result<u64> {
	let result =
		sqlx::query("DELETE FROM pipeline_jobs WHERE status = 'DONE' AND updated_at < $1")
			.bind(before)
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected())
}

pub async fn get_by_dedupe_key<'e, E>(executor: E, dedupe_key: &str) -> Result<Option<PipelineJob>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {JOB_COLUMNS} FROM pipeline_jobs WHERE dedupe_key = $1");

	Ok(sqlx::query_as::<_, PipelineJob>(&sql).bind(dedupe_key).fetch_optional(executor).await?)
}
