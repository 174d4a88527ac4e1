use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{EvidenceRow, RangeSummary, Snapshot},
};

const SNAPSHOT_COLUMNS: &str = "\
	snapshot_id,
	org_id,
	cluster_id,
	sequence_number,
	trigger_kind,
	synthesis_text,
	metrics,
	member_count,
	captured_at";
const SUMMARY_COLUMNS: &str = "\
	summary_id,
	org_id,
	cluster_id,
	first_sequence,
	last_sequence,
	started_at,
	ended_at,
	first_metrics,
	last_metrics,
	evidence_note_ids,
	snapshot_count,
	created_at";

#[derive(Debug)]
pub struct NewSnapshot<'a> {
	pub snapshot_id: Uuid,
	pub org_id: Uuid,
	pub cluster_id: Uuid,
	pub sequence_number: i64,
	pub trigger_kind: &'a str,
	pub synthesis_text: Option<&'a str>,
	pub metrics: &'a Value,
	pub member_count: i64,
	pub captured_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewRangeSummary<'a> {
	pub summary_id: Uuid,
	pub org_id: Uuid,
	pub cluster_id: Uuid,
	pub first_sequence: i64,
	pub last_sequence: i64,
	pub started_at: OffsetDateTime,
	pub ended_at: OffsetDateTime,
	pub first_metrics: &'a Value,
	pub last_metrics: &'a Value,
	pub evidence_note_ids: &'a [Uuid],
	pub snapshot_count: i32,
	pub created_at: OffsetDateTime,
}

pub async fn latest_snapshot<'e, E>(executor: E, cluster_id: Uuid) -> Result<Option<Snapshot>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {SNAPSHOT_COLUMNS}
FROM cluster_snapshots
WHERE cluster_id = $1
ORDER BY sequence_number DESC
LIMIT 1"
	);

	Ok(sqlx::query_as::<_, Snapshot>(&sql).bind(cluster_id).fetch_optional(executor).await?)
}

/// Next sequence number for a cluster. Folded ranges count, so numbering never restarts
/// after retention deletes rows.
pub async fn next_sequence_number<'e, E>(executor: E, cluster_id: Uuid) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"\
SELECT GREATEST(
	COALESCE((SELECT max(sequence_number) FROM cluster_snapshots WHERE cluster_id = $1), 0),
	COALESCE((SELECT max(last_sequence) FROM snapshot_range_summaries WHERE cluster_id = $1), 0)
) + 1",
	)
	.bind(cluster_id)
	.fetch_one(executor)
	.await?)
}

pub async fn insert_snapshot<'e, E>(executor: E, snapshot: &NewSnapshot<'_>) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO cluster_snapshots (
	snapshot_id,
	org_id,
	cluster_id,
	sequence_number,
	trigger_kind,
	synthesis_text,
	metrics,
	member_count,
	captured_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(snapshot.snapshot_id)
	.bind(snapshot.org_id)
	.bind(snapshot.cluster_id)
	.bind(snapshot.sequence_number)
	.bind(snapshot.trigger_kind)
	.bind(snapshot.synthesis_text)
	.bind(snapshot.metrics)
	.bind(snapshot.member_count)
	.bind(snapshot.captured_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Attaches ranked evidence to a snapshot. `evidence` holds `(note_id, relevance_score)` in
/// rank order.
pub async fn insert_evidence<'e, E>(
	executor: E,
	snapshot_id: Uuid,
	evidence: &[(Uuid, i16)],
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	if evidence.is_empty() {
		return Ok(());
	}

	let note_ids: Vec<Uuid> = evidence.iter().map(|(note_id, _)| *note_id).collect();
	let scores: Vec<i16> = evidence.iter().map(|(_, score)| *score).collect();

	sqlx::query(
		"\
INSERT INTO snapshot_evidence (snapshot_id, rank, note_id, relevance_score)
SELECT $1, (e.ordinality - 1)::integer, e.note_id, e.relevance_score
FROM unnest($2::uuid[], $3::smallint[]) WITH ORDINALITY AS e(note_id, relevance_score, ordinality)",
	)
	.bind(snapshot_id)
	.bind(&note_ids)
	.bind(&scores)
	.execute(executor)
	.await?;

	Ok(())
}

/// Snapshots newer than every folded range, ascending.
pub async fn list_unfolded_snapshots<'e, E>(executor: E, cluster_id: Uuid) -> Result<Vec<Snapshot>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {SNAPSHOT_COLUMNS}
FROM cluster_snapshots
WHERE cluster_id = $1
	AND sequence_number > COALESCE(
		(SELECT max(last_sequence) FROM snapshot_range_summaries WHERE cluster_id = $1),
		0
	)
ORDER BY sequence_number ASC"
	);

	Ok(sqlx::query_as::<_, Snapshot>(&sql).bind(cluster_id).fetch_all(executor).await?)
}

pub async fn get_snapshot<'e, E>(executor: E, snapshot_id: Uuid) -> Result<Option<Snapshot>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM cluster_snapshots WHERE snapshot_id = $1");

	Ok(sqlx::query_as::<_, Snapshot>(&sql).bind(snapshot_id).fetch_optional(executor).await?)
}

/// Evidence for the given snapshots joined with the cited notes, in rank order per snapshot.
pub async fn list_evidence<'e, E>(executor: E, snapshot_ids: &[Uuid]) -> Result<Vec<EvidenceRow>>
where
	E: PgExecutor<'e>,
{
	if snapshot_ids.is_empty() {
		return Ok(Vec::new());
	}

	Ok(sqlx::query_as::<_, EvidenceRow>(
		"\
SELECT
	e.snapshot_id,
	e.rank,
	e.note_id,
	e.relevance_score,
	n.content,
	n.clarified_title,
	n.author_job_title,
	n.author_department,
	n.author_seniority
FROM snapshot_evidence e
JOIN notes n ON n.note_id = e.note_id
WHERE e.snapshot_id = ANY($1)
ORDER BY e.snapshot_id, e.rank ASC",
	)
	.bind(snapshot_ids)
	.fetch_all(executor)
	.await?)
}

pub async fn insert_range_summary<'e, E>(executor: E, summary: &NewRangeSummary<'_>) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO snapshot_range_summaries (
	summary_id,
	org_id,
	cluster_id,
	first_sequence,
	last_sequence,
	started_at,
	ended_at,
	first_metrics,
	last_metrics,
	evidence_note_ids,
	snapshot_count,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (cluster_id, first_sequence) DO NOTHING",
	)
	.bind(summary.summary_id)
	.bind(summary.org_id)
	.bind(summary.cluster_id)
	.bind(summary.first_sequence)
	.bind(summary.last_sequence)
	.bind(summary.started_at)
	.bind(summary.ended_at)
	.bind(summary.first_metrics)
	.bind(summary.last_metrics)
	.bind(summary.evidence_note_ids)
	.bind(summary.snapshot_count)
	.bind(summary.created_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn list_range_summaries<'e, E>(executor: E, cluster_id: Uuid) -> Result<Vec<RangeSummary>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {SUMMARY_COLUMNS}
FROM snapshot_range_summaries
WHERE cluster_id = $1
ORDER BY first_sequence ASC"
	);

	Ok(sqlx::query_as::<_, RangeSummary>(&sql).bind(cluster_id).fetch_all(executor).await?)
}

/// Deletes snapshot rows of archived clusters that a range summary already covers. Rows of
/// active clusters are never touched.
pub async fn delete_folded_snapshots<'e, E>(executor: E) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
DELETE FROM cluster_snapshots s
USING clusters c
WHERE c.cluster_id = s.cluster_id
	AND c.status = 'archived'
	AND s.sequence_number <= (
		SELECT max(r.last_sequence)
		FROM snapshot_range_summaries r
		WHERE r.cluster_id = s.cluster_id
	)",
	)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Clusters with more than `min_snapshots` unfolded snapshots, as retention candidates.
pub async fn retention_candidates<'e, E>(executor: E, min_snapshots: i64) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"\
SELECT s.cluster_id
FROM cluster_snapshots s
WHERE s.sequence_number > COALESCE(
	(SELECT max(r.last_sequence) FROM snapshot_range_summaries r WHERE r.cluster_id = s.cluster_id),
	0
)
GROUP BY s.cluster_id
HAVING count(*) > $1
ORDER BY s.cluster_id",
	)
	.bind(min_snapshots)
	.fetch_all(executor)
	.await?)
}
