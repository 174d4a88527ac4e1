//! Time Machine read path.
//!
//! Every read runs in a `REPEATABLE READ, READ ONLY` transaction. It sees one consistent
//! database snapshot, takes no locks, and never waits on the write path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Error, Result, notes::author_descriptor};
use cairn_domain::{
	metrics::{self, ClusterMetrics},
	status::ClusterStatus,
};
use cairn_storage::{
	clusters,
	models::{Cluster, ClusterListing, EvidenceRow, RangeSummary, Snapshot},
	pillars, snapshots,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterView {
	pub cluster_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub pillar: String,
	pub title: String,
	pub status: ClusterStatus,
	pub member_count: i64,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	pub impact_score: f64,
	pub revision: i64,
	pub synthesis_text: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub last_updated_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub archived_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListClustersRequest {
	pub org_id: Uuid,
	#[serde(default)]
	pub pillar_id: Option<Uuid>,
	#[serde(default)]
	pub min_relevance: Option<f64>,
	#[serde(default)]
	pub include_archived: bool,
}

/// Cluster summary for visualization layers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterSummary {
	pub cluster_id: Uuid,
	pub pillar_id: Uuid,
	pub pillar: String,
	pub title: String,
	pub status: ClusterStatus,
	pub impact_score: f64,
	pub volume: i64,
	pub avg_relevance: f64,
	pub velocity_score: f64,
	#[serde(with = "crate::time_serde")]
	pub last_updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EvidenceView {
	pub note_id: Uuid,
	pub rank: i32,
	pub content: String,
	pub title: Option<String>,
	pub author: String,
	pub relevance_score: i16,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SnapshotView {
	pub snapshot_id: Uuid,
	pub cluster_id: Uuid,
	pub sequence_number: i64,
	pub trigger: String,
	pub synthesis_text: Option<String>,
	pub metrics: ClusterMetrics,
	#[serde(with = "crate::time_serde")]
	pub captured_at: OffsetDateTime,
	pub evidence: Vec<EvidenceView>,
}

/// A folded run of old snapshots.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RangeView {
	pub first_sequence: i64,
	pub last_sequence: i64,
	pub snapshot_count: i32,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub ended_at: OffsetDateTime,
	pub first_metrics: Value,
	pub last_metrics: Value,
	pub evidence_note_ids: Vec<Uuid>,
}
impl From<RangeSummary> for RangeView {
	fn from(row: RangeSummary) -> Self {
		Self {
			first_sequence: row.first_sequence,
			last_sequence: row.last_sequence,
			snapshot_count: row.snapshot_count,
			started_at: row.started_at,
			ended_at: row.ended_at,
			first_metrics: row.first_metrics,
			last_metrics: row.last_metrics,
			evidence_note_ids: row.evidence_note_ids,
		}
	}
}

/// Ordered history of a cluster: folded ranges first, then individual snapshots, both by
/// ascending sequence number.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HistoryResponse {
	pub cluster_id: Uuid,
	pub ranges: Vec<RangeView>,
	pub snapshots: Vec<SnapshotView>,
}

/// Latest snapshot next to the cluster's live metrics.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PresentView {
	pub cluster: ClusterView,
	pub snapshot: Option<SnapshotView>,
	pub live_metrics: ClusterMetrics,
}

impl CairnService {
	pub async fn get_cluster(&self, org_id: Uuid, cluster_id: Uuid) -> Result<ClusterView> {
		let mut tx = self.read_tx().await?;
		let view = load_cluster_view(&mut tx, org_id, cluster_id).await?;

		tx.commit().await?;

		Ok(view)
	}

	pub async fn list_clusters(&self, req: ListClustersRequest) -> Result<Vec<ClusterSummary>> {
		if let Some(min) = req.min_relevance
			&& !(min.is_finite() && (0.0..=10.0).contains(&min))
		{
			return Err(Error::InvalidRequest {
				message: "min_relevance must be between 0 and 10.".to_string(),
			});
		}

		let mut tx = self.read_tx().await?;
		let rows = clusters::list_clusters(
			&mut *tx,
			req.org_id,
			req.pillar_id,
			req.min_relevance,
			req.include_archived,
		)
		.await?;

		tx.commit().await?;

		rows.into_iter().map(summary_from_listing).collect()
	}

	/// Full history of a cluster, pinned to one consistent read.
	pub async fn cluster_history(&self, org_id: Uuid, cluster_id: Uuid) -> Result<HistoryResponse> {
		let mut tx = self.read_tx().await?;

		load_cluster(&mut tx, org_id, cluster_id).await?;

		let ranges = snapshots::list_range_summaries(&mut *tx, cluster_id).await?;
		let rows = snapshots::list_unfolded_snapshots(&mut *tx, cluster_id).await?;
		let snapshots = with_evidence(&mut tx, rows).await?;

		tx.commit().await?;

		Ok(HistoryResponse {
			cluster_id,
			ranges: ranges.into_iter().map(RangeView::from).collect(),
			snapshots,
		})
	}

	pub async fn get_snapshot(&self, org_id: Uuid, snapshot_id: Uuid) -> Result<SnapshotView> {
		let mut tx = self.read_tx().await?;
		let row = snapshots::get_snapshot(&mut *tx, snapshot_id)
			.await?
			.filter(|row| row.org_id == org_id)
			.ok_or_else(|| Error::NotFound {
				message: format!("Snapshot {snapshot_id} does not exist."),
			})?;
		let mut views = with_evidence(&mut tx, vec![row]).await?;

		tx.commit().await?;

		views.pop().ok_or_else(|| Error::Storage {
			message: format!("Snapshot {snapshot_id} could not be assembled."),
		})
	}

	pub async fn present(&self, org_id: Uuid, cluster_id: Uuid) -> Result<PresentView> {
		let mut tx = self.read_tx().await?;
		let cluster = load_cluster_view(&mut tx, org_id, cluster_id).await?;
		let latest = snapshots::latest_snapshot(&mut *tx, cluster_id).await?;
		let snapshot = with_evidence(&mut tx, latest.into_iter().collect()).await?.pop();

		tx.commit().await?;

		let live_metrics = ClusterMetrics {
			avg_relevance: cluster.avg_relevance,
			member_count: cluster.member_count,
			velocity_score: cluster.velocity_score,
		};

		Ok(PresentView { cluster, snapshot, live_metrics })
	}

	async fn read_tx(&self) -> Result<Transaction<'static, Postgres>> {
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
			.execute(&mut *tx)
			.await?;

		Ok(tx)
	}
}

async fn load_cluster(
	tx: &mut Transaction<'_, Postgres>,
	org_id: Uuid,
	cluster_id: Uuid,
) -> Result<Cluster> {
	clusters::get_cluster(&mut **tx, cluster_id)
		.await?
		.filter(|cluster| cluster.org_id == org_id)
		.ok_or_else(|| Error::NotFound { message: format!("Cluster {cluster_id} does not exist.") })
}

async fn load_cluster_view(
	tx: &mut Transaction<'_, Postgres>,
	org_id: Uuid,
	cluster_id: Uuid,
) -> Result<ClusterView> {
	let cluster = load_cluster(tx, org_id, cluster_id).await?;
	let pillar = pillars::get_pillar(&mut **tx, cluster.pillar_id).await?.ok_or_else(|| {
		Error::Storage { message: format!("Pillar {} is missing.", cluster.pillar_id) }
	})?;

	Ok(ClusterView {
		status: ClusterStatus::parse(&cluster.status)?,
		impact_score: metrics::impact_score(cluster.avg_relevance, cluster.member_count),
		cluster_id: cluster.cluster_id,
		org_id: cluster.org_id,
		pillar_id: cluster.pillar_id,
		pillar: pillar.name,
		title: cluster.title,
		member_count: cluster.member_count,
		avg_relevance: cluster.avg_relevance,
		velocity_score: cluster.velocity_score,
		revision: cluster.revision,
		synthesis_text: cluster.synthesis_text,
		created_at: cluster.created_at,
		last_updated_at: cluster.last_updated_at,
		archived_at: cluster.archived_at,
	})
}

async fn with_evidence(
	tx: &mut Transaction<'_, Postgres>,
	rows: Vec<Snapshot>,
) -> Result<Vec<SnapshotView>> {
	let ids: Vec<Uuid> = rows.iter().map(|row| row.snapshot_id).collect();
	let mut evidence: HashMap<Uuid, Vec<EvidenceView>> = HashMap::new();

	for row in snapshots::list_evidence(&mut **tx, &ids).await? {
		evidence.entry(row.snapshot_id).or_default().push(evidence_view(row));
	}

	rows.into_iter()
		.map(|row| {
			let metrics = ClusterMetrics::from_value(&row.metrics).ok_or_else(|| Error::Storage {
				message: format!("Snapshot {} has malformed metrics.", row.snapshot_id),
			})?;

			Ok(SnapshotView {
				evidence: evidence.remove(&row.snapshot_id).unwrap_or_default(),
				snapshot_id: row.snapshot_id,
				cluster_id: row.cluster_id,
				sequence_number: row.sequence_number,
				trigger: row.trigger_kind,
				synthesis_text: row.synthesis_text,
				metrics,
				captured_at: row.captured_at,
			})
		})
		.collect()
}

fn evidence_view(row: EvidenceRow) -> EvidenceView {
	EvidenceView {
		author: author_descriptor(
			&row.author_job_title,
			&row.author_department,
			&row.author_seniority,
		),
		note_id: row.note_id,
		rank: row.rank,
		content: row.content,
		title: row.clarified_title,
		relevance_score: row.relevance_score,
	}
}

fn summary_from_listing(row: ClusterListing) -> Result<ClusterSummary> {
	Ok(ClusterSummary {
		status: ClusterStatus::parse(&row.status)?,
		impact_score: metrics::impact_score(row.avg_relevance, row.member_count),
		cluster_id: row.cluster_id,
		pillar_id: row.pillar_id,
		pillar: row.pillar_name,
		title: row.title,
		volume: row.member_count,
		avg_relevance: row.avg_relevance,
		velocity_score: row.velocity_score,
		last_updated_at: row.last_updated_at,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn summaries_carry_impact_and_volume() {
		let now = OffsetDateTime::UNIX_EPOCH;
		let summary = summary_from_listing(ClusterListing {
			cluster_id: Uuid::nil(),
			pillar_id: Uuid::nil(),
			pillar_name: "General".to_string(),
			title: "Faster builds".to_string(),
			member_count: 3,
			avg_relevance: 8.0,
			velocity_score: 0.5,
			status: "active".to_string(),
			created_at: now,
			last_updated_at: now,
		})
		.expect("Listing must convert.");

		assert_eq!(summary.volume, 3);
		assert!((summary.impact_score - 8.0 * 4.0_f64.ln()).abs() < 1e-12);
		assert_eq!(summary.status, ClusterStatus::Active);
	}
}
