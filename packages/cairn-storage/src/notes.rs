use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{MemberRow, NewNote, Note},
};

const NOTE_COLUMNS: &str = "\
	note_id,
	org_id,
	pillar_id,
	author_job_title,
	author_department,
	author_seniority,
	content,
	clarified_title,
	clarified_content,
	idempotency_key,
	embedding::text AS embedding,
	relevance_score,
	status,
	cluster_id,
	scored_at,
	assigned_at,
	retracted_at,
	last_error,
	created_at,
	updated_at";

/// Inserts a new note. Returns `false` when the org already holds a note with the same
/// idempotency key.
pub async fn insert_note<'e, E>(executor: E, note: &NewNote<'_>) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO notes (
	note_id,
	org_id,
	pillar_id,
	author_job_title,
	author_department,
	author_seniority,
	content,
	idempotency_key,
	status,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
ON CONFLICT (org_id, idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING",
	)
	.bind(note.note_id)
	.bind(note.org_id)
	.bind(note.pillar_id)
	.bind(note.author_job_title)
	.bind(note.author_department)
	.bind(note.author_seniority)
	.bind(note.content)
	.bind(note.idempotency_key)
	.bind(note.status)
	.bind(note.now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn get_note<'e, E>(executor: E, note_id: Uuid) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE note_id = $1");

	Ok(sqlx::query_as::<_, Note>(&sql).bind(note_id).fetch_optional(executor).await?)
}

/// Loads and row-locks a note for the rest of the transaction.
pub async fn get_note_for_update<'e, E>(executor: E, note_id: Uuid) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE note_id = $1 FOR UPDATE");

	Ok(sqlx::query_as::<_, Note>(&sql).bind(note_id).fetch_optional(executor).await?)
}

/// Notes with the given ids, in no particular order. Missing ids are skipped.
pub async fn get_notes<'e, E>(executor: E, note_ids: &[Uuid]) -> Result<Vec<Note>>
where
	E: PgExecutor<'e>,
{
	if note_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE note_id = ANY($1)");

	Ok(sqlx::query_as::<_, Note>(&sql).bind(note_ids).fetch_all(executor).await?)
}

pub async fn find_by_idempotency_key<'e, E>(
	executor: E,
	org_id: Uuid,
	idempotency_key: &str,
) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql =
		format!("SELECT {NOTE_COLUMNS} FROM notes WHERE org_id = $1 AND idempotency_key = $2");

	Ok(sqlx::query_as::<_, Note>(&sql)
		.bind(org_id)
		.bind(idempotency_key)
		.fetch_optional(executor)
		.await?)
}

/// Writes embedding and score together and moves the note to `scored`.
///
/// Only notes still awaiting enrichment are touched, so a retracted or already scored note
/// stays as it is. Returns whether the row changed.
#[allow(clippy::too_many_arguments)]
pub async fn record_enrichment<'e, E>(
	executor: E,
	note_id: Uuid,
	embedding_text: &str,
	relevance_score: i16,
	clarified_title: Option<&str>,
	clarified_content: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET embedding = $2::text::vector,
	relevance_score = $3,
	clarified_title = $4,
	clarified_content = $5,
	status = 'scored',
	scored_at = $6,
	last_error = NULL,
	updated_at = $6
WHERE note_id = $1
	AND status IN ('queued', 'pending_enrichment')",
	)
	.bind(note_id)
	.bind(embedding_text)
	.bind(relevance_score)
	.bind(clarified_title)
	.bind(clarified_content)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Moves a note that is still awaiting enrichment to `status`, recording the failure.
pub async fn mark_enrichment_failure<'e, E>(
	executor: E,
	note_id: Uuid,
	status: &str,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET status = $2,
	last_error = $3,
	updated_at = $4
WHERE note_id = $1
	AND status IN ('queued', 'pending_enrichment')",
	)
	.bind(note_id)
	.bind(status)
	.bind(error_text)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Oldest scored, unassigned note of a partition, row-locked. Arrival order is
/// `(created_at, note_id)`.
pub async fn next_ready_note<'e, E>(
	executor: E,
	org_id: Uuid,
	pillar_id: Uuid,
) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {NOTE_COLUMNS}
FROM notes
WHERE org_id = $1
	AND pillar_id = $2
	AND status = 'scored'
	AND cluster_id IS NULL
ORDER BY created_at ASC, note_id ASC
LIMIT 1
FOR UPDATE"
	);

	Ok(sqlx::query_as::<_, Note>(&sql)
		.bind(org_id)
		.bind(pillar_id)
		.fetch_optional(executor)
		.await?)
}

/// Sets `cluster_id` on a scored, unassigned note. Returns the number of rows changed, which
/// is 0 when the note was already assigned or is no longer eligible.
pub async fn assign_note<'e, E>(
	executor: E,
	note_id: Uuid,
	cluster_id: Uuid,
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET cluster_id = $2,
	status = 'clustered',
	assigned_at = $3,
	updated_at = $3
WHERE note_id = $1
	AND cluster_id IS NULL
	AND status = 'scored'",
	)
	.bind(note_id)
	.bind(cluster_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Marks a note retracted and clears its membership.
pub async fn retract_note<'e, E>(executor: E, note_id: Uuid, now: OffsetDateTime) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE notes
SET status = 'retracted',
	cluster_id = NULL,
	retracted_at = $2,
	updated_at = $2
WHERE note_id = $1",
	)
	.bind(note_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Current members of a cluster with the values the aggregate is derived from.
pub async fn cluster_members<'e, E>(executor: E, cluster_id: Uuid) -> Result<Vec<MemberRow>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_as::<_, MemberRow>(
		"\
SELECT
	note_id,
	embedding::text AS embedding,
	relevance_score,
	created_at,
	assigned_at
FROM notes
WHERE cluster_id = $1
	AND embedding IS NOT NULL
	AND relevance_score IS NOT NULL
ORDER BY assigned_at ASC, note_id ASC",
	)
	.bind(cluster_id)
	.fetch_all(executor)
	.await?)
}

pub async fn count_joins_since<'e, E>(
	executor: E,
	cluster_id: Uuid,
	since: OffsetDateTime,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"SELECT count(*) FROM notes WHERE cluster_id = $1 AND assigned_at >= $2",
	)
	.bind(cluster_id)
	.bind(since)
	.fetch_one(executor)
	.await?)
}

pub async fn last_member_at<'e, E>(executor: E, cluster_id: Uuid) -> Result<Option<OffsetDateTime>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar("SELECT max(assigned_at) FROM notes WHERE cluster_id = $1")
		.bind(cluster_id)
		.fetch_one(executor)
		.await?)
}
