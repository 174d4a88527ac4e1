//! Long-horizon compaction of snapshot history.
//!
//! Policies only plan. Callers load immutable history, ask a policy which contiguous prefix
//! to fold, and persist the resulting [`RangeSummary`].

use std::collections::HashMap;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cairn_config::Retention;

/// A persisted snapshot as seen by a retention policy.
#[derive(Clone, Debug)]
pub struct SnapshotRecord {
	pub snapshot_id: Uuid,
	pub sequence_number: i64,
	pub captured_at: OffsetDateTime,
	pub metrics: Value,
	pub evidence: Vec<Uuid>,
}

/// One archived range that replaces a run of contiguous snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeSummary {
	pub first_sequence: i64,
	pub last_sequence: i64,
	pub started_at: OffsetDateTime,
	pub ended_at: OffsetDateTime,
	pub first_metrics: Value,
	pub last_metrics: Value,
	pub evidence: Vec<Uuid>,
	pub snapshot_ids: Vec<Uuid>,
}

pub trait RetentionPolicy: Send + Sync {
	/// Plans at most one fold over `history`, which holds the not-yet-folded snapshots of one
	/// cluster in ascending sequence order.
	fn plan(
		&self,
		history: &[SnapshotRecord],
		now: OffsetDateTime,
		evidence_limit: usize,
	) -> Option<RangeSummary>;
}

/// Keeps the newest `keep_recent` snapshots and folds the older run that has aged past
/// `min_age`.
#[derive(Clone, Copy, Debug)]
pub struct KeepRecentPolicy {
	pub keep_recent: usize,
	pub min_age: Duration,
}
impl KeepRecentPolicy {
	pub fn from_config(cfg: &Retention) -> Self {
		Self {
			keep_recent: cfg.keep_recent as usize,
			min_age: Duration::days(i64::from(cfg.min_age_days)),
		}
	}
}
impl RetentionPolicy for KeepRecentPolicy {
	fn plan(
		&self,
		history: &[SnapshotRecord],
		now: OffsetDateTime,
		evidence_limit: usize,
	) -> Option<RangeSummary> {
		let foldable = history.len().saturating_sub(self.keep_recent);
		let cutoff = now - self.min_age;
		let mut end = 0;

		for (idx, record) in history.iter().take(foldable).enumerate() {
			if record.captured_at > cutoff {
				break;
			}
			if idx > 0 && record.sequence_number != history[idx - 1].sequence_number + 1 {
				break;
			}

			end = idx + 1;
		}

		// Folding a single snapshot saves nothing.
		if end < 2 {
			return None;
		}

		Some(summarize(&history[..end], evidence_limit))
	}
}

fn summarize(run: &[SnapshotRecord], evidence_limit: usize) -> RangeSummary {
	let first = &run[0];
	let last = &run[run.len() - 1];
	let mut counts: HashMap<Uuid, (usize, usize)> = HashMap::new();
	let mut order = 0;

	for record in run {
		for note_id in &record.evidence {
			let entry = counts.entry(*note_id).or_insert((0, order));

			entry.0 += 1;
			order += 1;
		}
	}

	let mut ranked: Vec<(Uuid, usize, usize)> =
		counts.into_iter().map(|(id, (count, first_seen))| (id, count, first_seen)).collect();

	ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
	ranked.truncate(evidence_limit);

	RangeSummary {
		first_sequence: first.sequence_number,
		last_sequence: last.sequence_number,
		started_at: first.captured_at,
		ended_at: last.captured_at,
		first_metrics: first.metrics.clone(),
		last_metrics: last.metrics.clone(),
		evidence: ranked.into_iter().map(|(id, _, _)| id).collect(),
		snapshot_ids: run.iter().map(|record| record.snapshot_id).collect(),
	}
}
