use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cairn_config::Snapshots;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
	Created,
	MemberStep,
	TimeFloor,
}
impl SnapshotTrigger {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::MemberStep => "member_step",
			Self::TimeFloor => "time_floor",
		}
	}
}

/// State recorded by the most recent snapshot of a cluster.
#[derive(Clone, Copy, Debug)]
pub struct LastSnapshot {
	pub captured_at: OffsetDateTime,
	pub member_count: i64,
}

/// Live state of a cluster at the moment the policy is consulted.
#[derive(Clone, Copy, Debug)]
pub struct ClusterProgress {
	pub member_count: i64,
	/// When the most recent member joined, if any member is still present.
	pub last_member_at: Option<OffsetDateTime>,
}

#[derive(Clone, Copy, Debug)]
pub struct SnapshotPolicy {
	pub member_step: i64,
	pub time_floor: Duration,
	pub evidence_limit: usize,
}
impl SnapshotPolicy {
	pub fn from_config(cfg: &Snapshots) -> Self {
		Self {
			member_step: i64::from(cfg.member_step.max(1)),
			time_floor: Duration::hours(i64::from(cfg.time_floor_hours)),
			evidence_limit: cfg.evidence_limit as usize,
		}
	}

	/// Decides whether a cluster is due a snapshot.
	///
	/// A cluster without snapshots is always due. After that, a snapshot fires when
	/// `member_count / member_step` has moved past the value recorded last time, or when the
	/// last snapshot is at least `time_floor` old and a member joined after it.
	pub fn evaluate(
		&self,
		progress: ClusterProgress,
		last: Option<LastSnapshot>,
		now: OffsetDateTime,
	) -> Option<SnapshotTrigger> {
		let Some(last) = last else {
			return Some(SnapshotTrigger::Created);
		};

		if progress.member_count / self.member_step > last.member_count / self.member_step {
			return Some(SnapshotTrigger::MemberStep);
		}

		let joined_since = progress.last_member_at.is_some_and(|at| at > last.captured_at);

		if joined_since && now - last.captured_at >= self.time_floor {
			return Some(SnapshotTrigger::TimeFloor);
		}

		None
	}
}

/// A member note eligible to be cited as snapshot evidence.
#[derive(Clone, Copy, Debug)]
pub struct EvidenceCandidate {
	pub note_id: Uuid,
	pub relevance_score: i16,
	pub created_at: OffsetDateTime,
}

/// Picks up to `limit` members by relevance descending, oldest first within a score, note id
/// last.
pub fn select_evidence(mut candidates: Vec<EvidenceCandidate>, limit: usize) -> Vec<Uuid> {
	candidates.sort_by(|a, b| {
		b.relevance_score
			.cmp(&a.relevance_score)
			.then_with(|| a.created_at.cmp(&b.created_at))
			.then_with(|| a.note_id.cmp(&b.note_id))
	});
	candidates.truncate(limit);

	candidates.into_iter().map(|candidate| candidate.note_id).collect()
}
