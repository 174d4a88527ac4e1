use crate::{Error, Result};

/// Checks that an embedding can participate in cosine routing.
pub fn validate_embedding(embedding: &[f32], expected_dim: usize) -> Result<()> {
	if embedding.len() != expected_dim {
		return Err(Error::DimensionMismatch { expected: expected_dim, actual: embedding.len() });
	}
	if let Some(index) = embedding.iter().position(|value| !value.is_finite()) {
		return Err(Error::NonFiniteComponent { index });
	}
	if norm(embedding) == 0.0 {
		return Err(Error::ZeroMagnitude);
	}

	Ok(())
}

/// Cosine similarity accumulated in f64.
///
/// Mismatched lengths or a zero-magnitude side yield 0.0, which never clears a positive
/// threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let denom = norm(a) * norm(b);

	if denom == 0.0 {
		return 0.0;
	}

	let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();

	(dot / denom).clamp(-1.0, 1.0) as f32
}

fn norm(v: &[f32]) -> f64 {
	v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}
