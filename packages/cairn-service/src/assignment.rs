//! Cluster Assignment Coordinator, the only writer of cluster membership.
//!
//! Every assignment runs in one transaction under the partition's advisory lock. Ready notes
//! of a partition are taken strictly in arrival order, so routing and tie-breaks replay
//! deterministically.

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	CairnService, Error, Result, notes::note_not_found, partition, pillars, snapshots, synthesis,
};
use cairn_domain::{
	centroid, metrics,
	routing::{self, Candidate, RouteDecision},
	snapshot::SnapshotPolicy,
	status::{ClusterStatus, NoteStatus},
	tenancy,
};
use cairn_storage::{
	clusters::{self, MembershipUpdate, NewCluster},
	models::Note,
	notes, vector,
};

const MAX_TITLE_CHARS: usize = 80;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AssignmentOutcome {
	pub note_id: Uuid,
	pub cluster_id: Uuid,
	pub created_cluster: bool,
	/// Similarity to the joined cluster, or the closest miss when a cluster was seeded.
	pub similarity: Option<f32>,
	pub member_count: i64,
	pub revision: i64,
	pub snapshot_sequence: Option<i64>,
}

impl CairnService {
	/// Assigns `note_id` to a cluster.
	///
	/// Older ready notes of the same partition are assigned first. A note that is already
	/// assigned, retracted or not yet scored yields no outcome, which makes replays safe.
	pub async fn assign_note(&self, note_id: Uuid) -> Result<Vec<AssignmentOutcome>> {
		let note =
			notes::get_note(&self.db.pool, note_id).await?.ok_or_else(|| note_not_found(note_id))?;

		if note.cluster_id.is_some() || NoteStatus::parse(&note.status)? != NoteStatus::Scored {
			tracing::debug!(note_id = %note_id, status = %note.status, "Skipping assignment.");

			return Ok(Vec::new());
		}

		let mut outcomes = Vec::new();

		while let Some(outcome) = self.assign_next(note.org_id, note.pillar_id).await? {
			let reached = outcome.note_id == note_id;

			outcomes.push(outcome);

			if reached {
				break;
			}
		}

		Ok(outcomes)
	}

	/// Assigns the oldest ready note of one partition, if any.
	async fn assign_next(&self, org_id: Uuid, pillar_id: Uuid) -> Result<Option<AssignmentOutcome>> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;

		partition::lock_partition(&mut *tx, org_id, pillar_id).await?;

		let Some(note) = notes::next_ready_note(&mut *tx, org_id, pillar_id).await? else {
			tx.commit().await?;

			return Ok(None);
		};
		let pillar = pillars::load_pillar(&mut *tx, pillar_id).await?;

		ensure_same_org("pillar", note.org_id, pillar.org_id)?;

		let embedding = note.embedding_vec()?.ok_or_else(|| Error::ConsistencyViolation {
			message: format!("Scored note {} has no embedding.", note.note_id),
		})?;
		let score = note.relevance_score.ok_or_else(|| Error::ConsistencyViolation {
			message: format!("Scored note {} has no relevance score.", note.note_id),
		})?;
		let rows = clusters::active_candidates(&mut *tx, org_id, pillar_id).await?;
		let centroids = rows
			.iter()
			.map(|row| vector::parse_vector(&row.centroid))
			.collect::<cairn_storage::Result<Vec<_>>>()?;
		let candidates: Vec<Candidate<'_>> = rows
			.iter()
			.zip(&centroids)
			.map(|(row, centroid)| Candidate {
				cluster_id: row.cluster_id,
				created_at: row.created_at,
				centroid: centroid.as_slice(),
			})
			.collect();
		let decision =
			routing::route(&candidates, &embedding, self.cfg.clustering.similarity_threshold);
		let (cluster_id, created_cluster, similarity) = match decision {
			RouteDecision::Join { cluster_id, similarity } => {
				self.join_cluster(&mut tx, &note, cluster_id, &embedding, score, now).await?;

				(cluster_id, false, Some(similarity))
			},
			RouteDecision::Create { best_similarity } => {
				let cluster_id = self.seed_cluster(&mut tx, &note, &embedding, score, now).await?;

				(cluster_id, true, best_similarity)
			},
		};
		let cluster = clusters::get_cluster(&mut *tx, cluster_id).await?.ok_or_else(|| {
			Error::Storage { message: format!("Cluster {cluster_id} vanished mid-assignment.") }
		})?;
		let policy = SnapshotPolicy::from_config(&self.cfg.snapshots);
		let snapshot = snapshots::capture_if_due(&mut tx, &policy, &cluster, now).await?;

		synthesis::enqueue_synthesis(&mut *tx, &cluster, now).await?;
		tx.commit().await?;

		tracing::info!(
			note_id = %note.note_id,
			cluster_id = %cluster_id,
			created_cluster,
			similarity = ?similarity,
			member_count = cluster.member_count,
			revision = cluster.revision,
			"Note assigned."
		);

		Ok(Some(AssignmentOutcome {
			note_id: note.note_id,
			cluster_id,
			created_cluster,
			similarity,
			member_count: cluster.member_count,
			revision: cluster.revision,
			snapshot_sequence: snapshot.map(|snapshot| snapshot.sequence_number),
		}))
	}

	async fn seed_cluster(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		note: &Note,
		embedding: &[f32],
		score: i16,
		now: OffsetDateTime,
	) -> Result<Uuid> {
		let cluster_id = Uuid::new_v4();
		let title = cluster_title(note);
		let centroid_text = vector::format_vector(embedding);

		clusters::insert_cluster(
			&mut **tx,
			&NewCluster {
				cluster_id,
				org_id: note.org_id,
				pillar_id: note.pillar_id,
				title: &title,
				centroid_text: &centroid_text,
				avg_relevance: f64::from(score),
				velocity_score: metrics::velocity_score(1, self.cfg.metrics.velocity_window_hours),
				now,
			},
		)
		.await?;
		claim_note(tx, note.note_id, cluster_id, now).await?;

		Ok(cluster_id)
	}

	async fn join_cluster(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		note: &Note,
		cluster_id: Uuid,
		embedding: &[f32],
		score: i16,
		now: OffsetDateTime,
	) -> Result<()> {
		let cluster =
			clusters::get_cluster_for_update(&mut **tx, cluster_id).await?.ok_or_else(|| {
				Error::NotFound { message: format!("Cluster {cluster_id} does not exist.") }
			})?;

		ensure_same_org("cluster", note.org_id, cluster.org_id)?;

		if ClusterStatus::parse(&cluster.status)? != ClusterStatus::Active {
			return Err(Error::ConsistencyViolation {
				message: format!("Cluster {cluster_id} is archived and cannot take members."),
			});
		}

		let count = u64::try_from(cluster.member_count).unwrap_or(0);
		let centroid = centroid::fold_member(&cluster.centroid_vec()?, count, embedding);
		let centroid_text = vector::format_vector(&centroid);

		claim_note(tx, note.note_id, cluster_id, now).await?;

		let velocity_score = snapshots::live_velocity(
			&mut **tx,
			self.cfg.metrics.velocity_window_hours,
			cluster_id,
			now,
		)
		.await?;

		clusters::update_membership(
			&mut **tx,
			cluster_id,
			&MembershipUpdate {
				centroid_text: &centroid_text,
				member_count: cluster.member_count + 1,
				avg_relevance: metrics::fold_average(cluster.avg_relevance, count, score),
				velocity_score,
				now,
			},
		)
		.await?;

		Ok(())
	}
}

/// Rejects a cross-org reference and logs it for operators.
pub(crate) fn ensure_same_org(kind: &'static str, expected: Uuid, actual: Uuid) -> Result<()> {
	tenancy::ensure_same_org(kind, expected, actual).map_err(|err| {
		tracing::error!(error = %err, "Consistency violation. Write aborted.");

		Error::from(err)
	})
}

/// Sets the note's cluster. Any outcome other than exactly one changed row means the note was
/// assigned twice, which aborts the transaction.
async fn claim_note(
	tx: &mut Transaction<'_, Postgres>,
	note_id: Uuid,
	cluster_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	let changed = notes::assign_note(&mut **tx, note_id, cluster_id, now).await?;

	if changed != 1 {
		tracing::error!(
			note_id = %note_id,
			cluster_id = %cluster_id,
			"Duplicate assignment attempt."
		);

		return Err(Error::ConsistencyViolation {
			message: format!("Note {note_id} is already assigned."),
		});
	}

	Ok(())
}

fn cluster_title(note: &Note) -> String {
	if let Some(title) = note.clarified_title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
		return title.to_string();
	}

	let content = note.content.trim();

	if content.chars().count() <= MAX_TITLE_CHARS {
		return content.to_string();
	}

	let mut title: String = content.chars().take(MAX_TITLE_CHARS - 3).collect();

	title.truncate(title.trim_end().len());
	title.push_str("...");

	title
}
