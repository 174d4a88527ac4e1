//! Synthesis Recomputation Worker logic.
//!
//! Each membership revision queues one synthesis job. Results are recorded per
//! `(cluster_id, revision)` and published only while that revision is still the cluster's
//! current membership, so replays, out-of-order completions and results that went stale during
//! the provider call are never shown. A failed provider call leaves the previous synthesis in
//! place.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Error, Result, notes::author_descriptor};
use cairn_domain::{
	snapshot::{self, EvidenceCandidate},
	status::{ClusterStatus, Stage},
};
use cairn_providers::completion::ChatMessage;
use cairn_storage::{
	clusters,
	models::{Cluster, Note},
	notes,
	queue::{self, NewJob},
};

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You write executive syntheses of clustered employee ideas. You receive a cluster title, its \
metrics and the most relevant member notes with their authors. Reply with two to four \
sentences of plain prose that state the shared idea, why it matters and who raises it. Do not \
use lists or headings and do not invent facts beyond the notes.";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisOutcome {
	/// The new text is now the cluster's live synthesis.
	Applied,
	/// The live synthesis is already at this revision or newer.
	AlreadyCurrent,
	/// A newer membership revision exists and has its own job.
	Superseded,
	/// The cluster is archived and no longer synthesized.
	Archived,
}

impl CairnService {
	/// Regenerates the synthesis of `cluster_id` for membership `revision`.
	pub async fn synthesize_cluster(
		&self,
		cluster_id: Uuid,
		revision: i64,
	) -> Result<SynthesisOutcome> {
		let cluster = clusters::get_cluster(&self.db.pool, cluster_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Cluster {cluster_id} does not exist.") }
		})?;

		if ClusterStatus::parse(&cluster.status)? == ClusterStatus::Archived {
			return Ok(SynthesisOutcome::Archived);
		}
		if cluster.synthesis_revision >= revision {
			return Ok(SynthesisOutcome::AlreadyCurrent);
		}
		if cluster.revision > revision {
			return Ok(SynthesisOutcome::Superseded);
		}

		let evidence = self.evidence_notes(cluster_id).await?;
		let messages = synthesis_messages(&cluster, &evidence);
		let request_id = format!("{cluster_id}:{revision}");
		let text = self.synthesize_with_timeout(&messages, &request_id).await?;
		let evidence_ids: Vec<Uuid> = evidence.iter().map(|note| note.note_id).collect();
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;

		clusters::insert_synthesis(&mut *tx, cluster_id, revision, &text, &evidence_ids, now)
			.await?;

		let applied = clusters::apply_synthesis(&mut *tx, cluster_id, revision, &text).await?;

		if !applied {
			let outcome = match clusters::get_cluster(&mut *tx, cluster_id).await? {
				Some(current) => unapplied_outcome(&current, revision)?,
				None => SynthesisOutcome::Archived,
			};

			tx.commit().await?;

			tracing::info!(
				cluster_id = %cluster_id,
				revision,
				outcome = ?outcome,
				"Synthesis result recorded but not published."
			);

			return Ok(outcome);
		}

		tx.commit().await?;

		tracing::info!(cluster_id = %cluster_id, revision, "Synthesis updated.");

		Ok(SynthesisOutcome::Applied)
	}

	/// Current top members of a cluster, ranked the way snapshot evidence is.
	async fn evidence_notes(&self, cluster_id: Uuid) -> Result<Vec<Note>> {
		let members = notes::cluster_members(&self.db.pool, cluster_id).await?;
		let candidates = members
			.iter()
			.map(|member| EvidenceCandidate {
				note_id: member.note_id,
				relevance_score: member.relevance_score,
				created_at: member.created_at,
			})
			.collect();
		let ranked =
			snapshot::select_evidence(candidates, self.cfg.snapshots.evidence_limit as usize);
		let mut by_id: HashMap<Uuid, Note> = notes::get_notes(&self.db.pool, &ranked)
			.await?
			.into_iter()
			.map(|note| (note.note_id, note))
			.collect();

		Ok(ranked.iter().filter_map(|note_id| by_id.remove(note_id)).collect())
	}

	async fn synthesize_with_timeout(
		&self,
		messages: &[ChatMessage],
		request_id: &str,
	) -> Result<String> {
		let cfg = &self.cfg.providers.synthesis;
		let budget = Duration::from_millis(cfg.timeout_ms);
		let call = self.providers.synthesis.synthesize(cfg, messages, request_id);

		match tokio::time::timeout(budget, call).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::TransientService {
				message: format!("Synthesis timed out after {} ms.", budget.as_millis()),
			}),
		}
	}
}

/// Why a finished synthesis for `revision` could not be published on `cluster`.
fn unapplied_outcome(cluster: &Cluster, revision: i64) -> Result<SynthesisOutcome> {
	if ClusterStatus::parse(&cluster.status)? == ClusterStatus::Archived {
		return Ok(SynthesisOutcome::Archived);
	}
	if cluster.synthesis_revision >= revision {
		return Ok(SynthesisOutcome::AlreadyCurrent);
	}

	Ok(SynthesisOutcome::Superseded)
}

/// Queues synthesis for the cluster's current revision. Returns `false` when that revision
/// is already queued.
pub(crate) async fn enqueue_synthesis<'e, E>(
	executor: E,
	cluster: &Cluster,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let dedupe_key = format!("synthesize:{}:{}", cluster.cluster_id, cluster.revision);

	Ok(queue::enqueue(
		executor,
		&NewJob {
			stage: Stage::Synthesize.as_str(),
			dedupe_key: &dedupe_key,
			org_id: cluster.org_id,
			note_id: None,
			cluster_id: Some(cluster.cluster_id),
			revision: Some(cluster.revision),
			available_at: now,
		},
	)
	.await?)
}

pub fn synthesis_messages(cluster: &Cluster, evidence: &[Note]) -> Vec<ChatMessage> {
	let notes: Vec<_> = evidence
		.iter()
		.map(|note| {
			serde_json::json!({
				"content": note.clarified_content.as_deref().unwrap_or(&note.content),
				"author": author_descriptor(
					&note.author_job_title,
					&note.author_department,
					&note.author_seniority,
				),
				"relevance_score": note.relevance_score,
			})
		})
		.collect();
	let payload = serde_json::json!({
		"title": cluster.title,
		"member_count": cluster.member_count,
		"avg_relevance": cluster.avg_relevance,
		"velocity_score": cluster.velocity_score,
		"notes": notes,
	});

	vec![ChatMessage::system(SYNTHESIS_SYSTEM_PROMPT), ChatMessage::user(payload.to_string())]
}
