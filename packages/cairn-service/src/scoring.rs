//! Relevance Scorer: enriches a queued note with its embedding and 1-10 relevance score.

use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Enrichment, EnrichmentRequest, Error, Result, notes::note_not_found};
use cairn_domain::{
	author::{AuthorContext, Seniority},
	relevance::RelevanceScore,
	similarity,
	status::{NoteStatus, Stage},
};
use cairn_providers::completion::ChatMessage;
use cairn_storage::{
	notes,
	queue::{self, NewJob},
	vector,
};

const RELEVANCE_SYSTEM_PROMPT: &str = "\
You grade idea submissions written by employees. Reply with one JSON object with the keys \
relevance_score, clarified_title and clarified_content.
relevance_score is an integer from 1 to 10 that measures how closely the content matches the \
author's own domain, as given by their job title and department. Commentary outside that \
domain scores lower than commentary inside it from someone of the same seniority. When the \
domain match is ambiguous, use 5.
clarified_title is a short title of at most 80 characters.
clarified_content restates the idea clearly in the author's voice and adds no new facts.";

impl CairnService {
	/// Scores one note and queues its assignment.
	///
	/// Notes that are no longer awaiting enrichment (already scored, retracted, or in manual
	/// review) are left untouched, so replays are harmless.
	pub async fn score_note(&self, note_id: Uuid) -> Result<()> {
		let note =
			notes::get_note(&self.db.pool, note_id).await?.ok_or_else(|| note_not_found(note_id))?;

		if !NoteStatus::parse(&note.status)?.awaits_enrichment() {
			tracing::debug!(note_id = %note_id, status = %note.status, "Skipping scoring.");

			return Ok(());
		}

		let req = EnrichmentRequest {
			note_id,
			request_id: cairn_providers::request_id(note_id, &note.content),
			author: AuthorContext {
				job_title: note.author_job_title.clone(),
				department: note.author_department.clone(),
				seniority: Seniority::parse(&note.author_seniority)?,
			},
			content: note.content.clone(),
		};
		let enrichment = self.enrich_with_timeout(&req).await?;

		similarity::validate_embedding(
			&enrichment.embedding,
			self.cfg.clustering.vector_dim as usize,
		)
		.map_err(|err| Error::TransientService {
			message: format!("Provider returned an unusable embedding. {err}"),
		})?;

		let now = OffsetDateTime::now_utc();
		let embedding_text = vector::format_vector(&enrichment.embedding);
		let mut tx = self.db.pool.begin().await?;
		let recorded = notes::record_enrichment(
			&mut *tx,
			note_id,
			&embedding_text,
			enrichment.relevance_score.get(),
			enrichment.clarified_title.as_deref(),
			enrichment.clarified_content.as_deref(),
			now,
		)
		.await?;

		if recorded {
			let dedupe_key = format!("assign:{note_id}");

			queue::enqueue(
				&mut *tx,
				&NewJob {
					stage: Stage::Assign.as_str(),
					dedupe_key: &dedupe_key,
					org_id: note.org_id,
					note_id: Some(note_id),
					cluster_id: None,
					revision: None,
					available_at: now,
				},
			)
			.await?;
		}

		tx.commit().await?;

		if recorded {
			tracing::info!(
				note_id = %note_id,
				relevance_score = enrichment.relevance_score.get(),
				"Note scored."
			);
		}

		Ok(())
	}

	/// Leaves a note in a visible degraded state after a failed scoring attempt.
	pub(crate) async fn record_scoring_failure(
		&self,
		note_id: Uuid,
		error_text: &str,
		exhausted: bool,
	) -> Result<()> {
		let status =
			if exhausted { NoteStatus::ManualReview } else { NoteStatus::PendingEnrichment };
		let changed = notes::mark_enrichment_failure(
			&self.db.pool,
			note_id,
			status.as_str(),
			error_text,
			OffsetDateTime::now_utc(),
		)
		.await?;

		if changed && exhausted {
			tracing::warn!(
				note_id = %note_id,
				"Scoring attempts exhausted. Note needs manual review."
			);
		}

		Ok(())
	}

	async fn enrich_with_timeout(&self, req: &EnrichmentRequest) -> Result<Enrichment> {
		let budget = Duration::from_millis(
			self.cfg.providers.embedding.timeout_ms + self.cfg.providers.relevance.timeout_ms,
		);
		let call = self.providers.enrichment.enrich(&self.cfg.providers, req);

		match tokio::time::timeout(budget, call).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::TransientService {
				message: format!("Enrichment timed out after {} ms.", budget.as_millis()),
			}),
		}
	}
}

/// Prompt asking the relevance model to grade `req` against its author's domain.
pub fn relevance_messages(req: &EnrichmentRequest) -> Vec<ChatMessage> {
	let payload = serde_json::json!({
		"author": {
			"job_title": req.author.job_title,
			"department": req.author.department,
			"seniority": req.author.seniority.as_str(),
		},
		"content": req.content,
	});

	vec![ChatMessage::system(RELEVANCE_SYSTEM_PROMPT), ChatMessage::user(payload.to_string())]
}

/// Builds an [`Enrichment`] from a grading reply. Missing or malformed scores fall back to the
/// neutral score.
pub fn parse_grading(embedding: Vec<f32>, graded: &Value) -> Enrichment {
	Enrichment {
		embedding,
		relevance_score: RelevanceScore::from_json(graded.get("relevance_score")),
		clarified_title: text_field(graded, "clarified_title"),
		clarified_content: text_field(graded, "clarified_content"),
	}
}

fn text_field(value: &Value, key: &str) -> Option<String> {
	value
		.get(key)
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(ToString::to_string)
}
