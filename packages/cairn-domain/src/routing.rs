use std::cmp::Ordering;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::similarity;

/// An active cluster in the note's partition, as seen by the router.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
	pub cluster_id: Uuid,
	pub created_at: OffsetDateTime,
	pub centroid: &'a [f32],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RouteDecision {
	/// Join the cluster whose centroid scored `similarity` against the note.
	Join { cluster_id: Uuid, similarity: f32 },
	/// Seed a new cluster. `best_similarity` is the closest miss, if any candidate existed.
	Create { best_similarity: Option<f32> },
}

/// Chooses the cluster a note joins.
///
/// The highest similarity wins. Exact ties go to the earliest `created_at`, then to the lowest
/// cluster id so the outcome is independent of candidate order. A best match below
/// `threshold` seeds a new cluster.
pub fn route(candidates: &[Candidate<'_>], embedding: &[f32], threshold: f32) -> RouteDecision {
	let mut best: Option<(f32, &Candidate<'_>)> = None;

	for candidate in candidates {
		let score = similarity::cosine_similarity(embedding, candidate.centroid);

		best = match best {
			Some((best_score, best_candidate))
				if !outranks(score, candidate, best_score, best_candidate) =>
				Some((best_score, best_candidate)),
			_ => Some((score, candidate)),
		};
	}

	match best {
		Some((score, candidate)) if score >= threshold =>
			RouteDecision::Join { cluster_id: candidate.cluster_id, similarity: score },
		Some((score, _)) => RouteDecision::Create { best_similarity: Some(score) },
		None => RouteDecision::Create { best_similarity: None },
	}
}

fn outranks(score: f32, candidate: &Candidate<'_>, best_score: f32, best: &Candidate<'_>) -> bool {
	match score.total_cmp(&best_score) {
		Ordering::Greater => true,
		Ordering::Less => false,
		Ordering::Equal => (candidate.created_at, candidate.cluster_id)
			.cmp(&(best.created_at, best.cluster_id))
			.is_lt(),
	}
}
