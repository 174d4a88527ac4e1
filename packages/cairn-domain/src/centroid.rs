//! Centroid maintenance. Every member weighs 1, so the centroid is the arithmetic mean of
//! member embeddings.

/// Folds one new member into an existing centroid: `(old * count + embedding) / (count + 1)`.
///
/// A `count` of zero seeds the centroid with the embedding itself.
pub fn fold_member(centroid: &[f32], count: u64, embedding: &[f32]) -> Vec<f32> {
	if count == 0 || centroid.len() != embedding.len() {
		return embedding.to_vec();
	}

	let weight = count as f64;
	let next = weight + 1.0;

	centroid
		.iter()
		.zip(embedding)
		.map(|(old, new)| ((f64::from(*old) * weight + f64::from(*new)) / next) as f32)
		.collect()
}

/// Exact mean of the given member embeddings, or `None` when there are no members.
///
/// Used after retraction, where subtracting a member back out would accumulate drift.
pub fn mean<'a, I>(members: I) -> Option<Vec<f32>>
where
	I: IntoIterator<Item = &'a [f32]>,
{
	let mut iter = members.into_iter();
	let first = iter.next()?;
	let mut sums: Vec<f64> = first.iter().map(|v| f64::from(*v)).collect();
	let mut count = 1_u64;

	for member in iter {
		if member.len() != sums.len() {
			continue;
		}

		for (sum, value) in sums.iter_mut().zip(member) {
			*sum += f64::from(*value);
		}

		count += 1;
	}

	let count = count as f64;

	Some(sums.into_iter().map(|sum| (sum / count) as f32).collect())
}
