//! RFC 3339 timestamps for response bodies. Values are written in UTC so snapshot times from
//! different writers compare as plain strings.

pub mod option;

use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&to_rfc3339(*value).map_err(serde::ser::Error::custom)?)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	from_rfc3339(&String::deserialize(deserializer)?).map_err(serde::de::Error::custom)
}

fn to_rfc3339(value: OffsetDateTime) -> Result<String, time::error::Format> {
	value.to_offset(UtcOffset::UTC).format(&Rfc3339)
}

fn from_rfc3339(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
	OffsetDateTime::parse(raw, &Rfc3339)
}
