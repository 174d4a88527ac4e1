use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Error, Result, pillars};
use cairn_domain::{
	author::AuthorContext,
	status::{NoteStatus, Stage},
};
use cairn_storage::{
	models::{NewNote, Note},
	notes,
	queue::{self, NewJob},
};

const MAX_IDEMPOTENCY_KEY_CHARS: usize = 128;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IngestRequest {
	pub org_id: Uuid,
	#[serde(default)]
	pub pillar_id: Option<Uuid>,
	pub author_context: AuthorContext,
	pub content: String,
	/// Replays with the same key return the original note instead of creating a new one.
	#[serde(default)]
	pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IngestResponse {
	pub note_id: Uuid,
	pub pillar_id: Uuid,
	pub status: NoteStatus,
	pub replayed: bool,
}
impl IngestResponse {
	fn replay_of(note: &Note) -> Result<Self> {
		Ok(Self {
			note_id: note.note_id,
			pillar_id: note.pillar_id,
			status: NoteStatus::parse(&note.status)?,
			replayed: true,
		})
	}
}

impl CairnService {
	/// Accepts a note and queues it for scoring.
	pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse> {
		let content = validate_content(&req.content, self.cfg.ingestion.max_content_chars)?;
		let author = req.author_context.normalized()?;
		let idempotency_key = normalize_idempotency_key(req.idempotency_key.as_deref())?;
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;

		if let Some(key) = idempotency_key.as_deref()
			&& let Some(existing) = notes::find_by_idempotency_key(&mut *tx, req.org_id, key).await?
		{
			tx.rollback().await?;

			return IngestResponse::replay_of(&existing);
		}

		let pillar = pillars::resolve_pillar(
			&mut tx,
			req.org_id,
			req.pillar_id,
			&self.cfg.ingestion.default_pillar_name,
			now,
		)
		.await?;
		let note_id = Uuid::new_v4();
		let inserted = notes::insert_note(
			&mut *tx,
			&NewNote {
				note_id,
				org_id: req.org_id,
				pillar_id: pillar.pillar_id,
				author_job_title: &author.job_title,
				author_department: &author.department,
				author_seniority: author.seniority.as_str(),
				content,
				idempotency_key: idempotency_key.as_deref(),
				status: NoteStatus::Queued.as_str(),
				now,
			},
		)
		.await?;

		if !inserted {
			// Lost a race against a concurrent request with the same key.
			let key = idempotency_key.as_deref().unwrap_or_default();
			let existing = notes::find_by_idempotency_key(&mut *tx, req.org_id, key)
				.await?
				.ok_or_else(|| Error::Storage {
					message: "Note insert was skipped without a conflicting row.".to_string(),
				})?;

			tx.rollback().await?;

			return IngestResponse::replay_of(&existing);
		}

		let dedupe_key = format!("score:{note_id}");

		queue::enqueue(
			&mut *tx,
			&NewJob {
				stage: Stage::Score.as_str(),
				dedupe_key: &dedupe_key,
				org_id: req.org_id,
				note_id: Some(note_id),
				cluster_id: None,
				revision: None,
				available_at: now,
			},
		)
		.await?;
		tx.commit().await?;

		tracing::info!(
			org_id = %req.org_id,
			pillar_id = %pillar.pillar_id,
			note_id = %note_id,
			"Note queued for scoring."
		);

		Ok(IngestResponse {
			note_id,
			pillar_id: pillar.pillar_id,
			status: NoteStatus::Queued,
			replayed: false,
		})
	}
}

fn validate_content(raw: &str, max_chars: u32) -> Result<&str> {
	let content = raw.trim();

	if content.is_empty() {
		return Err(Error::InvalidRequest { message: "content must be non-empty.".to_string() });
	}
	if content.chars().count() > max_chars as usize {
		return Err(Error::InvalidRequest {
			message: format!("content must be at most {max_chars} characters."),
		});
	}

	Ok(content)
}

fn normalize_idempotency_key(raw: Option<&str>) -> Result<Option<String>> {
	let Some(key) = raw.map(str::trim) else {
		return Ok(None);
	};

	if key.is_empty() {
		return Err(Error::InvalidRequest {
			message: "idempotency_key must be non-empty when present.".to_string(),
		});
	}
	if key.chars().count() > MAX_IDEMPOTENCY_KEY_CHARS {
		return Err(Error::InvalidRequest {
			message: format!(
				"idempotency_key must be at most {MAX_IDEMPOTENCY_KEY_CHARS} characters."
			),
		});
	}

	Ok(Some(key.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn content_is_trimmed_and_bounded_by_characters() {
		assert_eq!(validate_content("  idea  ", 10).expect("Valid content."), "idea");
		assert!(validate_content(" \n\t", 10).is_err());
		assert!(validate_content("ééééé", 5).is_ok());
		assert!(validate_content("ééééé", 4).is_err());
	}

	#[test]
	fn idempotency_keys_must_be_meaningful() {
		assert_eq!(normalize_idempotency_key(None).expect("Absent key is fine."), None);
		assert_eq!(
			normalize_idempotency_key(Some(" retry-1 ")).expect("Valid key."),
			Some("retry-1".to_string())
		);
		assert!(normalize_idempotency_key(Some("  ")).is_err());
		assert!(normalize_idempotency_key(Some(&"k".repeat(129))).is_err());
	}
}
