//! Per-(org, pillar) serialization of cluster membership writes.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::Result;

/// Advisory lock key for a partition: the first 8 bytes of
/// `blake3("cairn:partition:<org_id>:<pillar_id>")`, read little-endian.
pub(crate) fn partition_key(org_id: Uuid, pillar_id: Uuid) -> i64 {
	let name = format!("cairn:partition:{org_id}:{pillar_id}");
	let hash = blake3::hash(name.as_bytes());
	let mut bytes = [0_u8; 8];

	bytes.copy_from_slice(&hash.as_bytes()[..8]);

	i64::from_le_bytes(bytes)
}

/// Takes the partition lock for the rest of the current transaction.
pub(crate) async fn lock_partition<'e, E>(executor: E, org_id: Uuid, pillar_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("SELECT pg_advisory_xact_lock($1)")
		.bind(partition_key(org_id, pillar_id))
		.execute(executor)
		.await?;

	Ok(())
}
