use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

const MAX_PARSE_ATTEMPTS: usize = 3;

const FENCED_JSON: &str = r"(?s)```(?:json)?\s*(\{.*\})\s*```";

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
	pub role: &'static str,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system", content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user", content: content.into() }
	}
}

/// Requests a JSON object from a chat model.
///
/// Replies that do not parse as an object are re-requested a bounded number of times under the
/// same request id.
pub async fn complete_json(
	cfg: &cairn_config::LlmProviderConfig,
	messages: &[ChatMessage],
	request_id: Option<&str>,
) -> Result<Value> {
	let client = client(cfg)?;

	for _ in 0..MAX_PARSE_ATTEMPTS {
		let json = send(&client, cfg, messages, request_id).await?;

		if let Some(parsed) = choice_content(&json).and_then(parse_json_object) {
			return Ok(parsed);
		}
	}

	Err(Error::invalid_response("Completion response is not a valid JSON object."))
}

/// Requests free text from a chat model.
pub async fn complete_text(
	cfg: &cairn_config::LlmProviderConfig,
	messages: &[ChatMessage],
	request_id: Option<&str>,
) -> Result<String> {
	let client = client(cfg)?;
	let json = send(&client, cfg, messages, request_id).await?;
	let text = choice_content(&json)
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.ok_or_else(|| Error::invalid_response("Completion response is missing content."))?;

	Ok(text.to_string())
}

fn client(cfg: &cairn_config::LlmProviderConfig) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?)
}

async fn send(
	client: &Client,
	cfg: &cairn_config::LlmProviderConfig,
	messages: &[ChatMessage],
	request_id: Option<&str>,
) -> Result<Value> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::request_headers(&cfg.api_key, &cfg.default_headers, request_id)?)
		.json(&body)
		.send()
		.await?;

	Ok(res.error_for_status()?.json().await?)
}

fn choice_content(json: &Value) -> Option<&str> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
}

fn parse_json_object(content: &str) -> Option<Value> {
	let fenced = Regex::new(FENCED_JSON).ok();
	let candidate = fenced
		.as_ref()
		.and_then(|re| re.captures(content))
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str())
		.unwrap_or(content);
	let parsed: Value = serde_json::from_str(candidate.trim()).ok()?;

	parsed.is_object().then_some(parsed)
}
