//! pgvector text codec. Vectors cross the wire as `[x,y,z]` text and are cast on the SQL side.

use crate::{Error, Result};

pub fn format_vector(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::InvalidArgument("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	without_brackets
		.split(',')
		.map(|part| {
			part.trim().parse::<f32>().map_err(|_| {
				Error::InvalidArgument("Vector text contains a non-numeric value.".to_string())
			})
		})
		.collect()
}
