//! Optional timestamps, written as `null` when absent.

use serde::{Deserialize as _, Deserializer, Serializer};
use time::OffsetDateTime;

pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let Some(value) = value else {
		return serializer.serialize_none();
	};

	crate::time_serde::serialize(value, serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	Option::<String>::deserialize(deserializer)?
		.map(|raw| super::from_rfc3339(&raw).map_err(serde::de::Error::custom))
		.transpose()
}
