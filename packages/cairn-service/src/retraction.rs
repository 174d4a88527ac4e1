use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	CairnService, Error, Result, assignment::ensure_same_org, notes::note_not_found, partition,
	snapshots, synthesis,
};
use cairn_domain::{
	centroid, metrics,
	status::{ClusterStatus, NoteStatus},
};
use cairn_storage::{
	clusters::{self, MembershipUpdate},
	notes, vector,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetractResponse {
	pub note_id: Uuid,
	pub status: NoteStatus,
	/// Cluster the note was removed from by this call.
	pub cluster_id: Option<Uuid>,
	pub cluster_status: Option<ClusterStatus>,
	pub member_count: Option<i64>,
}
impl RetractResponse {
	fn unassigned(note_id: Uuid) -> Self {
		Self {
			note_id,
			status: NoteStatus::Retracted,
			cluster_id: None,
			cluster_status: None,
			member_count: None,
		}
	}
}

impl CairnService {
	/// Retracts a note. Idempotent.
	///
	/// A note that has not been assigned yet simply drops out of the pipeline. An assigned note
	/// is removed from its cluster, whose centroid and average are recomputed exactly from the
	/// remaining members. A cluster left without members is archived.
	pub async fn retract_note(&self, org_id: Uuid, note_id: Uuid) -> Result<RetractResponse> {
		let note = notes::get_note(&self.db.pool, note_id)
			.await?
			.filter(|note| note.org_id == org_id)
			.ok_or_else(|| note_not_found(note_id))?;

		if NoteStatus::parse(&note.status)? == NoteStatus::Retracted {
			return Ok(RetractResponse::unassigned(note_id));
		}

		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;

		// Same lock order as assignment: partition first, then rows.
		partition::lock_partition(&mut *tx, note.org_id, note.pillar_id).await?;

		let note = notes::get_note_for_update(&mut *tx, note_id)
			.await?
			.ok_or_else(|| note_not_found(note_id))?;

		if NoteStatus::parse(&note.status)? == NoteStatus::Retracted {
			tx.commit().await?;

			return Ok(RetractResponse::unassigned(note_id));
		}

		notes::retract_note(&mut *tx, note_id, now).await?;

		let response = match note.cluster_id {
			Some(cluster_id) => self.remove_member(&mut tx, org_id, note_id, cluster_id, now).await?,
			None => RetractResponse::unassigned(note_id),
		};

		tx.commit().await?;

		tracing::info!(
			note_id = %note_id,
			cluster_id = ?response.cluster_id,
			member_count = ?response.member_count,
			"Note retracted."
		);

		Ok(response)
	}

	async fn remove_member(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		org_id: Uuid,
		note_id: Uuid,
		cluster_id: Uuid,
		now: OffsetDateTime,
	) -> Result<RetractResponse> {
		let cluster =
			clusters::get_cluster_for_update(&mut **tx, cluster_id).await?.ok_or_else(|| {
				Error::ConsistencyViolation {
					message: format!("Note {note_id} references missing cluster {cluster_id}."),
				}
			})?;

		ensure_same_org("cluster", org_id, cluster.org_id)?;

		let members = notes::cluster_members(&mut **tx, cluster_id).await?;

		if members.is_empty() {
			clusters::archive_cluster(&mut **tx, cluster_id, now).await?;

			tracing::info!(
				cluster_id = %cluster_id,
				"Cluster archived after losing its last member."
			);

			return Ok(RetractResponse {
				note_id,
				status: NoteStatus::Retracted,
				cluster_id: Some(cluster_id),
				cluster_status: Some(ClusterStatus::Archived),
				member_count: Some(0),
			});
		}

		let embeddings = members
			.iter()
			.map(|member| vector::parse_vector(&member.embedding))
			.collect::<cairn_storage::Result<Vec<_>>>()?;
		let centroid = centroid::mean(embeddings.iter().map(Vec::as_slice)).ok_or_else(|| {
			Error::Storage { message: format!("Cluster {cluster_id} has no member embeddings.") }
		})?;
		let scores: Vec<i16> = members.iter().map(|member| member.relevance_score).collect();
		let member_count = members.len() as i64;
		let velocity_score = snapshots::live_velocity(
			&mut **tx,
			self.cfg.metrics.velocity_window_hours,
			cluster_id,
			now,
		)
		.await?;
		let centroid_text = vector::format_vector(&centroid);

		clusters::update_membership(
			&mut **tx,
			cluster_id,
			&MembershipUpdate {
				centroid_text: &centroid_text,
				member_count,
				avg_relevance: metrics::mean_relevance(&scores),
				velocity_score,
				now,
			},
		)
		.await?;

		let cluster = clusters::get_cluster(&mut **tx, cluster_id).await?.ok_or_else(|| {
			Error::Storage { message: format!("Cluster {cluster_id} vanished mid-retraction.") }
		})?;

		synthesis::enqueue_synthesis(&mut **tx, &cluster, now).await?;

		Ok(RetractResponse {
			note_id,
			status: NoteStatus::Retracted,
			cluster_id: Some(cluster_id),
			cluster_status: Some(ClusterStatus::Active),
			member_count: Some(member_count),
		})
	}
}
