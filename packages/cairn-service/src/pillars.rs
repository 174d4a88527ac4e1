use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CairnService, Error, Result};
use cairn_domain::tenancy;
use cairn_storage::{models::Pillar, pillars};

const MAX_PILLAR_NAME_CHARS: usize = 120;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreatePillarRequest {
	pub org_id: Uuid,
	pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PillarView {
	pub pillar_id: Uuid,
	pub org_id: Uuid,
	pub name: String,
	pub is_default: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<Pillar> for PillarView {
	fn from(pillar: Pillar) -> Self {
		Self {
			pillar_id: pillar.pillar_id,
			org_id: pillar.org_id,
			name: pillar.name,
			is_default: pillar.is_default,
			created_at: pillar.created_at,
		}
	}
}

impl CairnService {
	pub async fn create_pillar(&self, req: CreatePillarRequest) -> Result<PillarView> {
		let name = validate_pillar_name(&req.name)?;
		let pillar = Pillar {
			pillar_id: Uuid::new_v4(),
			org_id: req.org_id,
			name,
			is_default: false,
			created_at: OffsetDateTime::now_utc(),
		};

		pillars::insert_pillar(&self.db.pool, &pillar).await?;

		tracing::info!(org_id = %pillar.org_id, pillar_id = %pillar.pillar_id, "Pillar created.");

		Ok(pillar.into())
	}

	pub async fn list_pillars(&self, org_id: Uuid) -> Result<Vec<PillarView>> {
		let rows = pillars::list_pillars(&self.db.pool, org_id).await?;

		Ok(rows.into_iter().map(PillarView::from).collect())
	}
}

/// Resolves the pillar a note is filed under.
///
/// An explicit pillar must exist and belong to `org_id`. Without one, the org's default pillar
/// is used and created on first use.
pub(crate) async fn resolve_pillar(
	conn: &mut sqlx::PgConnection,
	org_id: Uuid,
	pillar_id: Option<Uuid>,
	default_name: &str,
	now: OffsetDateTime,
) -> Result<Pillar> {
	match pillar_id {
		Some(pillar_id) => {
			let pillar = load_pillar(&mut *conn, pillar_id).await?;

			if let Err(err) = tenancy::ensure_same_org("pillar", org_id, pillar.org_id) {
				tracing::error!(
					error = %err,
					org_id = %org_id,
					pillar_id = %pillar_id,
					"Rejected cross-org pillar reference."
				);

				return Err(err.into());
			}

			Ok(pillar)
		},
		None => {
			pillars::insert_default_pillar_if_missing(&mut *conn, org_id, default_name, now).await?;

			pillars::find_pillar_by_name(&mut *conn, org_id, default_name).await?.ok_or_else(|| {
				Error::Storage { message: "Default pillar vanished after insert.".to_string() }
			})
		},
	}
}

pub(crate) async fn load_pillar<'e, E>(executor: E, pillar_id: Uuid) -> Result<Pillar>
where
	E: PgExecutor<'e>,
{
	pillars::get_pillar(executor, pillar_id)
		.await?
		.ok_or_else(|| Error::NotFound { message: format!("Pillar {pillar_id} does not exist.") })
}

fn validate_pillar_name(raw: &str) -> Result<String> {
	let name = raw.trim();

	if name.is_empty() {
		return Err(Error::InvalidRequest { message: "name must be non-empty.".to_string() });
	}
	if name.chars().count() > MAX_PILLAR_NAME_CHARS {
		return Err(Error::InvalidRequest {
			message: format!("name must be at most {MAX_PILLAR_NAME_CHARS} characters."),
		});
	}

	Ok(name.to_string())
}
