//! HTTP adapters for the external embedding and chat-completion services.

pub mod completion;
pub mod embedding;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Header carrying the deduplication key for provider-side retries.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Stable enrichment request id for a note: blake3 over the note id and its content.
///
/// Retries of the same note reuse the id so the provider can deduplicate them.
pub fn request_id(note_id: Uuid, content: &str) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(note_id.as_bytes());
	hasher.update(&[0]);
	hasher.update(content.as_bytes());

	hasher.finalize().to_hex().to_string()
}

fn request_headers(
	api_key: &str,
	default_headers: &Map<String, Value>,
	request_id: Option<&str>,
) -> Result<HeaderMap> {
	let mut headers = auth_headers(api_key, default_headers)?;

	if let Some(request_id) = request_id {
		headers.insert(
			HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
			HeaderValue::from_str(request_id)?,
		);
	}

	Ok(headers)
}
