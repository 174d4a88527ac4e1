use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metrics frozen into each snapshot and served by the present view.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClusterMetrics {
	pub avg_relevance: f64,
	pub member_count: i64,
	pub velocity_score: f64,
}
impl ClusterMetrics {
	pub fn to_value(self) -> Value {
		serde_json::json!({
			"avg_relevance": self.avg_relevance,
			"member_count": self.member_count,
			"velocity_score": self.velocity_score,
		})
	}

	pub fn from_value(value: &Value) -> Option<Self> {
		serde_json::from_value(value.clone()).ok()
	}
}

/// Running mean after adding one score to `count` existing ones.
pub fn fold_average(avg: f64, count: u64, score: i16) -> f64 {
	if count == 0 {
		return f64::from(score);
	}

	let weight = count as f64;

	(avg * weight + f64::from(score)) / (weight + 1.0)
}

/// Exact mean of a set of scores, 0.0 when empty.
pub fn mean_relevance(scores: &[i16]) -> f64 {
	if scores.is_empty() {
		return 0.0;
	}

	scores.iter().map(|score| f64::from(*score)).sum::<f64>() / scores.len() as f64
}

/// Member joins per day over the trailing window.
pub fn velocity_score(joins_in_window: u64, window_hours: u32) -> f64 {
	if window_hours == 0 {
		return 0.0;
	}

	joins_in_window as f64 / (f64::from(window_hours) / 24.0)
}

/// Ranking weight for visualization layers: `avg_relevance * ln(1 + member_count)`.
pub fn impact_score(avg_relevance: f64, member_count: i64) -> f64 {
	if member_count <= 0 {
		return 0.0;
	}

	avg_relevance * (member_count as f64).ln_1p()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn running_average_matches_exact_mean() {
		let scores = [8_i16, 3, 10, 5];
		let mut avg = 0.0;

		for (count, score) in scores.iter().enumerate() {
			avg = fold_average(avg, count as u64, *score);
		}

		assert!((avg - mean_relevance(&scores)).abs() < 1e-12);
	}

	#[test]
	fn velocity_is_joins_per_day() {
		assert_eq!(velocity_score(14, 168), 2.0);
		assert_eq!(velocity_score(3, 24), 3.0);
		assert_eq!(velocity_score(3, 0), 0.0);
	}

	#[test]
	fn impact_grows_with_volume() {
		assert_eq!(impact_score(7.0, 0), 0.0);
		assert!(impact_score(7.0, 10) > impact_score(7.0, 2));
		assert!((impact_score(2.0, 1) - 2.0 * 2_f64.ln()).abs() < 1e-12);
	}

	#[test]
	fn metrics_round_trip_through_the_snapshot_map() {
		let metrics = ClusterMetrics { avg_relevance: 6.5, member_count: 3, velocity_score: 0.25 };
		let value = metrics.to_value();

		assert_eq!(value["member_count"], 3);
		assert_eq!(ClusterMetrics::from_value(&value), Some(metrics));
	}
}
