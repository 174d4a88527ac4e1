use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{CandidateRow, Cluster, ClusterListing},
};

const CLUSTER_COLUMNS: &str = "\
	cluster_id,
	org_id,
	pillar_id,
	title,
	centroid::text AS centroid,
	member_count,
	avg_relevance,
	velocity_score,
	status,
	revision,
	synthesis_text,
	synthesis_revision,
	created_at,
	last_updated_at,
	archived_at";

#[derive(Debug)]
pub struct NewCluster<'a> {
	pub cluster_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub title: &'a str,
	pub centroid_text: &'a str,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	pub now: OffsetDateTime,
}

/// Aggregate values written back after a membership change.
#[derive(Debug)]
pub struct MembershipUpdate<'a> {
	pub centroid_text: &'a str,
	pub member_count: i64,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	pub now: OffsetDateTime,
}

/// Inserts a cluster seeded by a single member at revision 1.
pub async fn insert_cluster<'e, E>(executor: E, cluster: &NewCluster<'_>) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO clusters (
	cluster_id,
	org_id,
	pillar_id,
	title,
	centroid,
	member_count,
	avg_relevance,
	velocity_score,
	status,
	revision,
	created_at,
	last_updated_at
)
VALUES ($1, $2, $3, $4, $5::text::vector, 1, $6, $7, 'active', 1, $8, $8)",
	)
	.bind(cluster.cluster_id)
	.bind(cluster.org_id)
	.bind(cluster.pillar_id)
	.bind(cluster.title)
	.bind(cluster.centroid_text)
	.bind(cluster.avg_relevance)
	.bind(cluster.velocity_score)
	.bind(cluster.now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_cluster<'e, E>(executor: E, cluster_id: Uuid) -> Result<Option<Cluster>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE cluster_id = $1");

	Ok(sqlx::query_as::<_, Cluster>(&sql).bind(cluster_id).fetch_optional(executor).await?)
}

pub async fn get_cluster_for_update<'e, E>(executor: E, cluster_id: Uuid) -> Result<Option<Cluster>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE cluster_id = $1 FOR UPDATE");

	Ok(sqlx::query_as::<_, Cluster>(&sql).bind(cluster_id).fetch_optional(executor).await?)
}

/// Active clusters of one partition, oldest first.
pub async fn active_candidates<'e, E>(
	executor: E,
	org_id: Uuid,
	pillar_id: Uuid,
) -> Result<Vec<CandidateRow>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_as::<_, CandidateRow>(
		"\
SELECT cluster_id, created_at, centroid::text AS centroid
FROM clusters
WHERE org_id = $1
	AND pillar_id = $2
	AND status = 'active'
ORDER BY created_at ASC, cluster_id ASC",
	)
	.bind(org_id)
	.bind(pillar_id)
	.fetch_all(executor)
	.await?)
}

/// Writes a new aggregate and bumps the revision. Returns the new revision.
pub async fn update_membership<'e, E>(
	executor: E,
	cluster_id: Uuid,
	update: &MembershipUpdate<'_>,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"\
UPDATE clusters
SET centroid = $2::text::vector,
	member_count = $3,
	avg_relevance = $4,
	velocity_score = $5,
	revision = revision + 1,
	last_updated_at = $6
WHERE cluster_id = $1
RETURNING revision",
	)
	.bind(cluster_id)
	.bind(update.centroid_text)
	.bind(update.member_count)
	.bind(update.avg_relevance)
	.bind(update.velocity_score)
	.bind(update.now)
	.fetch_one(executor)
	.await?)
}

/// Archives a cluster that has lost its last member. The centroid is left as it was.
pub async fn archive_cluster<'e, E>(executor: E, cluster_id: Uuid, now: OffsetDateTime) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"\
UPDATE clusters
SET member_count = 0,
	avg_relevance = 0,
	velocity_score = 0,
	status = 'archived',
	revision = revision + 1,
	archived_at = $2,
	last_updated_at = $2
WHERE cluster_id = $1
RETURNING revision",
	)
	.bind(cluster_id)
	.bind(now)
	.fetch_one(executor)
	.await?)
}

pub async fn set_velocity<'e, E>(executor: E, cluster_id: Uuid, velocity_score: f64) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("UPDATE clusters SET velocity_score = $2 WHERE cluster_id = $1")
		.bind(cluster_id)
		.bind(velocity_score)
		.execute(executor)
		.await?;

	Ok(())
}

/// Cluster summaries for one org, most recently updated first.
pub async fn list_clusters<'e, E>(
	executor: E,
	org_id: Uuid,
	pillar_id: Option<Uuid>,
	min_relevance: Option<f64>,
	include_archived: bool,
) -> Result<Vec<ClusterListing>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_as::<_, ClusterListing>(
		"\
SELECT
	c.cluster_id,
	c.pillar_id,
	p.name AS pillar_name,
	c.title,
	c.member_count,
	c.avg_relevance,
	c.velocity_score,
	c.status,
	c.created_at,
	c.last_updated_at
FROM clusters c
JOIN pillars p ON p.org_id = c.org_id AND p.pillar_id = c.pillar_id
WHERE c.org_id = $1
	AND ($2::uuid IS NULL OR c.pillar_id = $2)
	AND ($3::double precision IS NULL OR c.avg_relevance >= $3)
	AND ($4 OR c.status = 'active')
ORDER BY c.last_updated_at DESC, c.cluster_id ASC",
	)
	.bind(org_id)
	.bind(pillar_id)
	.bind(min_relevance)
	.bind(include_archived)
	.fetch_all(executor)
	.await?)
}

/// Records one synthesis result. Replays for the same revision are no-ops.
pub async fn insert_synthesis<'e, E>(
	executor: E,
	cluster_id: Uuid,
	revision: i64,
	synthesis_text: &str,
	evidence_note_ids: &[Uuid],
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO cluster_syntheses (cluster_id, revision, synthesis_text, evidence_note_ids, created_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (cluster_id, revision) DO NOTHING",
	)
	.bind(cluster_id)
	.bind(revision)
	.bind(synthesis_text)
	.bind(evidence_note_ids)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Publishes a synthesis on the cluster. Only a result for the current membership revision of
/// an active cluster is published, and never over a newer live synthesis.
pub async fn apply_synthesis<'e, E>(
	executor: E,
	cluster_id: Uuid,
	revision: i64,
	synthesis_text: &str,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE clusters
SET synthesis_text = $3,
	synthesis_revision = $2
WHERE cluster_id = $1
	AND revision = $2
	AND status = 'active'
	AND synthesis_revision < $2",
	)
	.bind(cluster_id)
	.bind(revision)
	.bind(synthesis_text)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Active clusters whose latest snapshot is at least as old as `captured_before` and that
/// gained a member after it.
pub async fn time_floor_due<'e, E>(
	executor: E,
	captured_before: OffsetDateTime,
	limit: i64,
) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	Ok(sqlx::query_scalar(
		"\
SELECT c.cluster_id
FROM clusters c
JOIN LATERAL (
	SELECT max(captured_at) AS captured_at
	FROM cluster_snapshots s
	WHERE s.cluster_id = c.cluster_id
) last ON TRUE
WHERE c.status = 'active'
	AND last.captured_at IS NOT NULL
	AND last.captured_at <= $1
	AND EXISTS (
		SELECT 1
		FROM notes n
		WHERE n.cluster_id = c.cluster_id
			AND n.assigned_at > last.captured_at
	)
ORDER BY last.captured_at ASC, c.cluster_id ASC
LIMIT $2",
	)
	.bind(captured_before)
	.bind(limit)
	.fetch_all(executor)
	.await?)
}
