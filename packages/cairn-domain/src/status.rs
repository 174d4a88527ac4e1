use serde::{Deserialize, Serialize};

use crate::{Error, Result};

macro_rules! string_enum {
	(
		$(#[$meta:meta])*
		$name:ident as $kind:literal { $($variant:ident => $text:literal),+ $(,)? }
	) => {
		$(#[$meta])*
		#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
		pub enum $name {
			$(#[serde(rename = $text)] $variant),+
		}
		impl $name {
			pub fn as_str(self) -> &'static str {
				match self {
					$(Self::$variant => $text),+
				}
			}

			pub fn parse(value: &str) -> Result<Self> {
				match value {
					$($text => Ok(Self::$variant),)+
					other => Err(Error::UnknownStatus { kind: $kind, value: other.to_string() }),
				}
			}
		}
		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str(self.as_str())
			}
		}
	};
}

string_enum! {
	/// Lifecycle of a note through the pipeline.
	NoteStatus as "note status" {
		Queued => "queued",
		PendingEnrichment => "pending_enrichment",
		ManualReview => "manual_review",
		Scored => "scored",
		Clustered => "clustered",
		Retracted => "retracted",
	}
}

string_enum! {
	ClusterStatus as "cluster status" {
		Active => "active",
		Archived => "archived",
	}
}

string_enum! {
	/// Typed pipeline stage a queued job belongs to.
	Stage as "pipeline stage" {
		Score => "SCORE",
		Assign => "ASSIGN",
		Synthesize => "SYNTHESIZE",
	}
}

string_enum! {
	JobStatus as "job status" {
		Pending => "PENDING",
		Failed => "FAILED",
		Done => "DONE",
		Dead => "DEAD",
	}
}

impl NoteStatus {
	/// Whether the scorer may still write an embedding and score for this note.
	pub fn awaits_enrichment(self) -> bool {
		matches!(self, Self::Queued | Self::PendingEnrichment)
	}
}
