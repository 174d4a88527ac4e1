//! Batch fold of long-horizon snapshot history into archived range summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Result};
use cairn_domain::retention::{KeepRecentPolicy, RetentionPolicy, SnapshotRecord};
use cairn_storage::{
	clusters,
	snapshots::{self, NewRangeSummary},
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct RetentionReport {
	pub clusters_examined: u64,
	pub summaries_written: u64,
	pub snapshots_deleted: u64,
}

impl CairnService {
	/// Folds history with the configured [`KeepRecentPolicy`].
	pub async fn apply_retention(&self, now: OffsetDateTime) -> Result<RetentionReport> {
		let policy = KeepRecentPolicy::from_config(&self.cfg.retention);

		self.apply_retention_with(&policy, now).await
	}

	/// Folds history with any policy.
	///
	/// Summaries are written for every cluster the policy selects. Snapshot rows behind a
	/// summary are deleted only once their cluster is archived.
	pub async fn apply_retention_with(
		&self,
		policy: &dyn RetentionPolicy,
		now: OffsetDateTime,
	) -> Result<RetentionReport> {
		let mut report = RetentionReport::default();

		for cluster_id in snapshots::retention_candidates(&self.db.pool, 1).await? {
			report.clusters_examined += 1;

			if self.fold_cluster(policy, cluster_id, now).await? {
				report.summaries_written += 1;
			}
		}

		report.snapshots_deleted = snapshots::delete_folded_snapshots(&self.db.pool).await?;

		tracing::info!(
			clusters_examined = report.clusters_examined,
			summaries_written = report.summaries_written,
			snapshots_deleted = report.snapshots_deleted,
			"Retention pass finished."
		);

		Ok(report)
	}

	async fn fold_cluster(
		&self,
		policy: &dyn RetentionPolicy,
		cluster_id: Uuid,
		now: OffsetDateTime,
	) -> Result<bool> {
		let mut tx = self.db.pool.begin().await?;
		// The row lock keeps snapshot capture and folding of one cluster apart.
		let Some(cluster) = clusters::get_cluster_for_update(&mut *tx, cluster_id).await? else {
			return Ok(false);
		};
		let rows = snapshots::list_unfolded_snapshots(&mut *tx, cluster_id).await?;
		let ids: Vec<Uuid> = rows.iter().map(|row| row.snapshot_id).collect();
		let mut evidence: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

		for row in snapshots::list_evidence(&mut *tx, &ids).await? {
			evidence.entry(row.snapshot_id).or_default().push(row.note_id);
		}

		let history: Vec<SnapshotRecord> = rows
			.into_iter()
			.map(|row| SnapshotRecord {
				evidence: evidence.remove(&row.snapshot_id).unwrap_or_default(),
				snapshot_id: row.snapshot_id,
				sequence_number: row.sequence_number,
				captured_at: row.captured_at,
				metrics: row.metrics,
			})
			.collect();
		let Some(plan) =
			policy.plan(&history, now, self.cfg.snapshots.evidence_limit as usize)
		else {
			return Ok(false);
		};
		let written = snapshots::insert_range_summary(
			&mut *tx,
			&NewRangeSummary {
				summary_id: Uuid::new_v4(),
				org_id: cluster.org_id,
				cluster_id,
				first_sequence: plan.first_sequence,
				last_sequence: plan.last_sequence,
				started_at: plan.started_at,
				ended_at: plan.ended_at,
				first_metrics: &plan.first_metrics,
				last_metrics: &plan.last_metrics,
				evidence_note_ids: &plan.evidence,
				snapshot_count: i32::try_from(plan.snapshot_ids.len()).unwrap_or(i32::MAX),
				created_at: now,
			},
		)
		.await?;

		tx.commit().await?;

		if written {
			tracing::info!(
				cluster_id = %cluster_id,
				first_sequence = plan.first_sequence,
				last_sequence = plan.last_sequence,
				"Snapshot range folded."
			);
		}

		Ok(written)
	}
}
