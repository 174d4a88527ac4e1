use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, vector};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Pillar {
	pub pillar_id: Uuid,
	pub org_id: Uuid,
	pub name: String,
	pub is_default: bool,
	pub created_at: OffsetDateTime,
}

/// A note row. `embedding` holds the pgvector text form.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Note {
	pub note_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub author_job_title: String,
	pub author_department: String,
	pub author_seniority: String,
	pub content: String,
	pub clarified_title: Option<String>,
	pub clarified_content: Option<String>,
	pub idempotency_key: Option<String>,
	pub embedding: Option<String>,
	pub relevance_score: Option<i16>,
	pub status: String,
	pub cluster_id: Option<Uuid>,
	pub scored_at: Option<OffsetDateTime>,
	pub assigned_at: Option<OffsetDateTime>,
	pub retracted_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Note {
	pub fn embedding_vec(&self) -> Result<Option<Vec<f32>>> {
		self.embedding.as_deref().map(vector::parse_vector).transpose()
	}
}

#[derive(Debug)]
pub struct NewNote<'a> {
	pub note_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub author_job_title: &'a str,
	pub author_department: &'a str,
	pub author_seniority: &'a str,
	pub content: &'a str,
	pub idempotency_key: Option<&'a str>,
	pub status: &'a str,
	pub now: OffsetDateTime,
}

/// A cluster row. `centroid` holds the pgvector text form.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Cluster {
	pub cluster_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub title: String,
	pub centroid: String,
	pub member_count: i64,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	pub status: String,
	pub revision: i64,
	pub synthesis_text: Option<String>,
	pub synthesis_revision: i64,
	pub created_at: OffsetDateTime,
	pub last_updated_at: OffsetDateTime,
	pub archived_at: Option<OffsetDateTime>,
}
impl Cluster {
	pub fn centroid_vec(&self) -> Result<Vec<f32>> {
		vector::parse_vector(&self.centroid)
	}
}

/// Cluster summary joined with its pillar name, for listings.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ClusterListing {
	pub cluster_id: Uuid,
	pub pillar_id: Uuid,
	pub pillar_name: String,
	pub title: String,
	pub member_count: i64,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub last_updated_at: OffsetDateTime,
}

/// Centroid of an active cluster, as loaded for routing.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CandidateRow {
	pub cluster_id: Uuid,
	pub created_at: OffsetDateTime,
	pub centroid: String,
}

/// Embedding and score of a current cluster member.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct MemberRow {
	pub note_id: Uuid,
	pub embedding: String,
	pub relevance_score: i16,
	pub created_at: OffsetDateTime,
	pub assigned_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Snapshot {
	pub snapshot_id: Uuid,
	pub org_id: Uuid,
	pub cluster_id: Uuid,
	pub sequence_number: i64,
	pub trigger_kind: String,
	pub synthesis_text: Option<String>,
	pub metrics: Value,
	pub member_count: i64,
	pub captured_at: OffsetDateTime,
}

/// Evidence entry joined with the cited note.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EvidenceRow {
	pub snapshot_id: Uuid,
	pub rank: i32,
	pub note_id: Uuid,
	pub relevance_score: i16,
	pub content: String,
	pub clarified_title: Option<String>,
	pub author_job_title: String,
	pub author_department: String,
	pub author_seniority: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct RangeSummary {
	pub summary_id: Uuid,
	pub org_id: Uuid,
	pub cluster_id: Uuid,
	pub first_sequence: i64,
	pub last_sequence: i64,
	pub started_at: OffsetDateTime,
	pub ended_at: OffsetDateTime,
	pub first_metrics: Value,
	pub last_metrics: Value,
	pub evidence_note_ids: Vec<Uuid>,
	pub snapshot_count: i32,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PipelineJob {
	pub job_id: Uuid,
	pub stage: String,
	pub dedupe_key: String,
	pub org_id: Uuid,
	pub note_id: Option<Uuid>,
	pub cluster_id: Option<Uuid>,
	pub revision: Option<i64>,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
