mod error;
mod types;

pub use error::{Error, Result};
pub use types::*;

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses, normalizes, and validates a config from TOML text.
pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
	] {
		if value.trim().is_empty() {
			return Err(Error::validation(format!("{label} must be non-empty.")));
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.clustering.vector_dim == 0 {
		return Err(Error::validation("clustering.vector_dim must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.clustering.vector_dim {
		return Err(Error::validation(
			"providers.embedding.dimensions must match clustering.vector_dim.",
		));
	}

	let threshold = cfg.clustering.similarity_threshold;

	if !threshold.is_finite() {
		return Err(Error::validation("clustering.similarity_threshold must be a finite number."));
	}
	if threshold <= 0.0 || threshold > 1.0 {
		return Err(Error::validation(
			"clustering.similarity_threshold must be in the range (0.0, 1.0].",
		));
	}
	if cfg.snapshots.member_step == 0 {
		return Err(Error::validation("snapshots.member_step must be greater than zero."));
	}
	if cfg.snapshots.time_floor_hours == 0 {
		return Err(Error::validation("snapshots.time_floor_hours must be greater than zero."));
	}
	if cfg.snapshots.evidence_limit == 0 {
		return Err(Error::validation("snapshots.evidence_limit must be greater than zero."));
	}
	if cfg.snapshots.sweep_interval_seconds == 0 {
		return Err(Error::validation(
			"snapshots.sweep_interval_seconds must be greater than zero.",
		));
	}
	if cfg.metrics.velocity_window_hours == 0 {
		return Err(Error::validation("metrics.velocity_window_hours must be greater than zero."));
	}
	if cfg.ingestion.max_content_chars == 0 {
		return Err(Error::validation("ingestion.max_content_chars must be greater than zero."));
	}
	if cfg.ingestion.default_pillar_name.trim().is_empty() {
		return Err(Error::validation("ingestion.default_pillar_name must be non-empty."));
	}

	validate_pipeline(&cfg.pipeline)?;

	if cfg.retention.enabled {
		if cfg.retention.keep_recent == 0 {
			return Err(Error::validation(
				"retention.keep_recent must be greater than zero when retention is enabled.",
			));
		}
		if cfg.retention.interval_seconds == 0 {
			return Err(Error::validation(
				"retention.interval_seconds must be greater than zero when retention is enabled.",
			));
		}
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("relevance", &cfg.providers.relevance.api_key),
		("synthesis", &cfg.providers.synthesis.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::validation(format!("Provider {label} api_key must be non-empty.")));
		}
	}
	for (label, timeout_ms) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("relevance", cfg.providers.relevance.timeout_ms),
		("synthesis", cfg.providers.synthesis.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::validation(format!(
				"Provider {label} timeout_ms must be greater than zero."
			)));
		}
	}

	Ok(())
}

fn validate_pipeline(pipeline: &Pipeline) -> Result<()> {
	if pipeline.concurrency == 0 {
		return Err(Error::validation("pipeline.concurrency must be greater than zero."));
	}
	if pipeline.claim_lease_seconds <= 0 {
		return Err(Error::validation("pipeline.claim_lease_seconds must be greater than zero."));
	}
	if pipeline.base_backoff_ms < 0 {
		return Err(Error::validation("pipeline.base_backoff_ms must be zero or greater."));
	}
	if pipeline.max_backoff_ms < pipeline.base_backoff_ms {
		return Err(Error::validation(
			"pipeline.max_backoff_ms must be at least pipeline.base_backoff_ms.",
		));
	}

	for (label, attempts) in [
		("pipeline.score_max_attempts", pipeline.score_max_attempts),
		("pipeline.assign_max_attempts", pipeline.assign_max_attempts),
		("pipeline.synthesis_max_attempts", pipeline.synthesis_max_attempts),
	] {
		if attempts <= 0 {
			return Err(Error::validation(format!("{label} must be greater than zero.")));
		}
	}

	if pipeline.purge_done_after_hours <= 0 {
		return Err(Error::validation("pipeline.purge_done_after_hours must be greater than zero."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.ingestion.default_pillar_name.trim();

	if trimmed.len() != cfg.ingestion.default_pillar_name.len() {
		cfg.ingestion.default_pillar_name = trimmed.to_string();
	}

	for base in [
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.relevance.api_base,
		&mut cfg.providers.synthesis.api_base,
	] {
		while base.ends_with('/') {
			base.pop();
		}
	}
}
