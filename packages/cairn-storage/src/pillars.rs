use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, models::Pillar};

const PILLAR_COLUMNS: &str = "pillar_id, org_id, name, is_default, created_at";

/// Inserts a pillar, failing with [`Error::Conflict`] when the org already has one by that name.
pub async fn insert_pillar<'e, E>(executor: E, pillar: &Pillar) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO pillars (pillar_id, org_id, name, is_default, created_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT DO NOTHING",
	)
	.bind(pillar.pillar_id)
	.bind(pillar.org_id)
	.bind(pillar.name.as_str())
	.bind(pillar.is_default)
	.bind(pillar.created_at)
	.execute(executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::Conflict(format!("Pillar {:?} already exists.", pillar.name)));
	}

	Ok(())
}

pub async fn get_pillar<'e, E>(executor: E, pillar_id: Uuid) -> Result<Option<Pillar>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {PILLAR_COLUMNS} FROM pillars WHERE pillar_id = $1");

	Ok(sqlx::query_as::<_, Pillar>(&sql).bind(pillar_id).fetch_optional(executor).await?)
}

pub async fn find_pillar_by_name<'e, E>(
	executor: E,
	org_id: Uuid,
	name: &str,
) -> Result<Option<Pillar>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {PILLAR_COLUMNS} FROM pillars WHERE org_id = $1 AND lower(name) = lower($2)"
	);

	Ok(sqlx::query_as::<_, Pillar>(&sql).bind(org_id).bind(name).fetch_optional(executor).await?)
}

pub async fn list_pillars<'e, E>(executor: E, org_id: Uuid) -> Result<Vec<Pillar>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {PILLAR_COLUMNS} FROM pillars WHERE org_id = $1 ORDER BY created_at ASC, pillar_id ASC"
	);

	Ok(sqlx::query_as::<_, Pillar>(&sql).bind(org_id).fetch_all(executor).await?)
}

/// Inserts the org's default pillar unless one with that name already exists.
///
/// Races between concurrent first ingestions resolve on the unique name index. Callers read
/// the surviving row back with [`find_pillar_by_name`].
pub async fn insert_default_pillar_if_missing<'e, E>(
	executor: E,
	org_id: Uuid,
	name: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO pillars (pillar_id, org_id, name, is_default, created_at)
VALUES ($1, $2, $3, TRUE, $4)
ON CONFLICT DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(org_id)
	.bind(name)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}
