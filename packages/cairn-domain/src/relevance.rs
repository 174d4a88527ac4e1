use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contextual relevance of a note to its author's domain, on a closed 1..=10 scale.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct RelevanceScore(u8);
impl RelevanceScore {
	pub const MAX: Self = Self(10);
	pub const MIN: Self = Self(1);
	/// Used when the provider cannot decide whether the note is in the author's domain.
	pub const NEUTRAL: Self = Self(5);

	pub fn new(value: i16) -> Option<Self> {
		(i16::from(Self::MIN.0)..=i16::from(Self::MAX.0))
			.contains(&value)
			.then_some(Self(value as u8))
	}

	/// Maps a raw provider reading onto the scale.
	///
	/// Missing or non-finite readings become [`Self::NEUTRAL`]. Everything else is rounded and
	/// clamped.
	pub fn from_raw(raw: Option<f64>) -> Self {
		match raw {
			Some(value) if value.is_finite() => {
				let clamped = value.round().clamp(f64::from(Self::MIN.0), f64::from(Self::MAX.0));

				Self(clamped as u8)
			},
			_ => Self::NEUTRAL,
		}
	}

	/// Reads a score out of a JSON field that may hold a number or a numeric string.
	pub fn from_json(value: Option<&Value>) -> Self {
		let raw = match value {
			Some(Value::Number(number)) => number.as_f64(),
			Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
			_ => None,
		};

		Self::from_raw(raw)
	}

	pub fn get(self) -> i16 {
		i16::from(self.0)
	}
}
impl TryFrom<i16> for RelevanceScore {
	type Error = String;

	fn try_from(value: i16) -> Result<Self, Self::Error> {
		Self::new(value).ok_or_else(|| format!("Relevance score {value} is outside 1..=10."))
	}
}
impl From<RelevanceScore> for i16 {
	fn from(score: RelevanceScore) -> Self {
		score.get()
	}
}
