//! Snapshot Manager: immutable, sequenced captures of a cluster's state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{CairnService, Result, partition};
use cairn_domain::{
	metrics::{self, ClusterMetrics},
	snapshot::{
		self, ClusterProgress, EvidenceCandidate, LastSnapshot, SnapshotPolicy, SnapshotTrigger,
	},
	status::ClusterStatus,
};
use cairn_storage::{
	clusters,
	models::Cluster,
	notes,
	snapshots::{self, NewSnapshot},
};

const SWEEP_BATCH: i64 = 200;

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct CapturedSnapshot {
	pub snapshot_id: Uuid,
	pub sequence_number: i64,
	pub trigger: SnapshotTrigger,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct SweepReport {
	pub examined: u64,
	pub captured: u64,
}

impl CairnService {
	/// Snapshots active clusters whose last snapshot passed the time floor and that gained a
	/// member since, for clusters that saw no later assignment to trigger it.
	pub async fn sweep_time_floor(&self, now: OffsetDateTime) -> Result<SweepReport> {
		let policy = SnapshotPolicy::from_config(&self.cfg.snapshots);
		let due = clusters::time_floor_due(&self.db.pool, now - policy.time_floor, SWEEP_BATCH)
			.await?;
		let mut report = SweepReport::default();

		for cluster_id in due {
			report.examined += 1;

			if self.sweep_cluster(&policy, cluster_id, now).await?.is_some() {
				report.captured += 1;
			}
		}

		Ok(report)
	}

	async fn sweep_cluster(
		&self,
		policy: &SnapshotPolicy,
		cluster_id: Uuid,
		now: OffsetDateTime,
	) -> Result<Option<CapturedSnapshot>> {
		let Some(cluster) = clusters::get_cluster(&self.db.pool, cluster_id).await? else {
			return Ok(None);
		};
		let mut tx = self.db.pool.begin().await?;

		partition::lock_partition(&mut *tx, cluster.org_id, cluster.pillar_id).await?;

		let Some(mut cluster) = clusters::get_cluster_for_update(&mut *tx, cluster_id).await?
		else {
			return Ok(None);
		};

		if ClusterStatus::parse(&cluster.status)? != ClusterStatus::Active {
			return Ok(None);
		}

		cluster.velocity_score = live_velocity(
			&mut *tx,
			self.cfg.metrics.velocity_window_hours,
			cluster_id,
			now,
		)
		.await?;

		clusters::set_velocity(&mut *tx, cluster_id, cluster.velocity_score).await?;

		let captured = capture_if_due(&mut tx, policy, &cluster, now).await?;

		tx.commit().await?;

		Ok(captured)
	}
}

/// Joins per day inside the trailing velocity window, as of `now`.
pub(crate) async fn live_velocity<'e, E>(
	executor: E,
	window_hours: u32,
	cluster_id: Uuid,
	now: OffsetDateTime,
) -> Result<f64>
where
	E: PgExecutor<'e>,
{
	let since = now - Duration::hours(i64::from(window_hours));
	let joins = notes::count_joins_since(executor, cluster_id, since).await?;

	Ok(metrics::velocity_score(u64::try_from(joins).unwrap_or(0), window_hours))
}

/// Captures a snapshot of `cluster` when the trigger policy says one is due.
///
/// Callers hold the cluster's partition lock, which keeps sequence numbers contiguous.
pub(crate) async fn capture_if_due(
	conn: &mut PgConnection,
	policy: &SnapshotPolicy,
	cluster: &Cluster,
	now: OffsetDateTime,
) -> Result<Option<CapturedSnapshot>> {
	let last = snapshots::latest_snapshot(&mut *conn, cluster.cluster_id).await?.map(|row| {
		LastSnapshot { captured_at: row.captured_at, member_count: row.member_count }
	});
	let progress = ClusterProgress {
		member_count: cluster.member_count,
		last_member_at: notes::last_member_at(&mut *conn, cluster.cluster_id).await?,
	};
	let Some(trigger) = policy.evaluate(progress, last, now) else {
		return Ok(None);
	};

	capture(conn, policy, cluster, trigger, now).await.map(Some)
}

async fn capture(
	conn: &mut PgConnection,
	policy: &SnapshotPolicy,
	cluster: &Cluster,
	trigger: SnapshotTrigger,
	now: OffsetDateTime,
) -> Result<CapturedSnapshot> {
	let members = notes::cluster_members(&mut *conn, cluster.cluster_id).await?;
	let scores: HashMap<Uuid, i16> =
		members.iter().map(|member| (member.note_id, member.relevance_score)).collect();
	let candidates = members
		.iter()
		.map(|member| EvidenceCandidate {
			note_id: member.note_id,
			relevance_score: member.relevance_score,
			created_at: member.created_at,
		})
		.collect();
	let evidence: Vec<(Uuid, i16)> = snapshot::select_evidence(candidates, policy.evidence_limit)
		.into_iter()
		.filter_map(|note_id| scores.get(&note_id).map(|score| (note_id, *score)))
		.collect();
	let metrics = ClusterMetrics {
		avg_relevance: cluster.avg_relevance,
		member_count: cluster.member_count,
		velocity_score: cluster.velocity_score,
	}
	.to_value();
	let snapshot_id = Uuid::new_v4();
	let sequence_number = snapshots::next_sequence_number(&mut *conn, cluster.cluster_id).await?;

	snapshots::insert_snapshot(
		&mut *conn,
		&NewSnapshot {
			snapshot_id,
			org_id: cluster.org_id,
			cluster_id: cluster.cluster_id,
			sequence_number,
			trigger_kind: trigger.as_str(),
			synthesis_text: cluster.synthesis_text.as_deref(),
			metrics: &metrics,
			member_count: cluster.member_count,
			captured_at: now,
		},
	)
	.await?;
	snapshots::insert_evidence(&mut *conn, snapshot_id, &evidence).await?;

	tracing::info!(
		cluster_id = %cluster.cluster_id,
		sequence_number,
		trigger = trigger.as_str(),
		evidence = evidence.len(),
		"Snapshot captured."
	);

	Ok(CapturedSnapshot { snapshot_id, sequence_number, trigger })
}
