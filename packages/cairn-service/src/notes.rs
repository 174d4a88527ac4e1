use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Error, Result};
use cairn_domain::{
	author::{AuthorContext, Seniority},
	status::NoteStatus,
};
use cairn_storage::{models::Note, notes};

/// Pipeline state of one note, including degraded states such as `pending_enrichment`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NoteView {
	pub note_id: Uuid,
	pub org_id: Uuid,
	pub pillar_id: Uuid,
	pub status: NoteStatus,
	pub cluster_id: Option<Uuid>,
	pub relevance_score: Option<i16>,
	pub clarified_title: Option<String>,
	pub last_error: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub scored_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub assigned_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub retracted_at: Option<OffsetDateTime>,
}
impl TryFrom<Note> for NoteView {
	type Error = Error;

	fn try_from(note: Note) -> Result<Self> {
		Ok(Self {
			status: NoteStatus::parse(&note.status)?,
			note_id: note.note_id,
			org_id: note.org_id,
			pillar_id: note.pillar_id,
			cluster_id: note.cluster_id,
			relevance_score: note.relevance_score,
			clarified_title: note.clarified_title,
			last_error: note.last_error,
			created_at: note.created_at,
			scored_at: note.scored_at,
			assigned_at: note.assigned_at,
			retracted_at: note.retracted_at,
		})
	}
}

impl CairnService {
	pub async fn get_note(&self, org_id: Uuid, note_id: Uuid) -> Result<NoteView> {
		let note = notes::get_note(&self.db.pool, note_id)
			.await?
			.filter(|note| note.org_id == org_id)
			.ok_or_else(|| note_not_found(note_id))?;

		note.try_into()
	}
}

/// Notes of other orgs are reported as missing.
pub(crate) fn note_not_found(note_id: Uuid) -> Error {
	Error::NotFound { message: format!("Note {note_id} does not exist.") }
}

/// Evidence label for an author, e.g. "Senior Product Manager, Product". Unrecognized
/// seniority values are shown as stored.
pub(crate) fn author_descriptor(job_title: &str, department: &str, seniority: &str) -> String {
	match Seniority::parse(seniority) {
		Ok(seniority) => AuthorContext {
			job_title: job_title.to_string(),
			department: department.to_string(),
			seniority,
		}
		.descriptor(),
		Err(_) => format!("{seniority} {job_title}, {department}"),
	}
}
