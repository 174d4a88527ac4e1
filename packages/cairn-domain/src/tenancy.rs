use uuid::Uuid;

use crate::{Error, Result};

/// Rejects a reference whose owning organization differs from the writer's.
pub fn ensure_same_org(kind: &'static str, expected: Uuid, actual: Uuid) -> Result<()> {
	if expected != actual {
		return Err(Error::CrossOrgReference { kind, expected, actual });
	}

	Ok(())
}
