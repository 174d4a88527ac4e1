use serde::Deserialize;
use serde_json::{Map, Value};

/// Similarity threshold τ a note must reach to join an existing cluster.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;
/// A snapshot fires whenever member_count crosses a multiple of this step.
pub const DEFAULT_SNAPSHOT_MEMBER_STEP: u32 = 3;
/// Minimum age of the last snapshot before a time-floor snapshot may fire.
pub const DEFAULT_SNAPSHOT_TIME_FLOOR_HOURS: u32 = 24;
/// Upper bound K on evidence notes stored per snapshot.
pub const DEFAULT_SNAPSHOT_EVIDENCE_LIMIT: u32 = 20;
pub const DEFAULT_SNAPSHOT_SWEEP_INTERVAL_SECONDS: u64 = 300;
/// Trailing window used to derive the velocity score.
pub const DEFAULT_VELOCITY_WINDOW_HOURS: u32 = 168;
pub const DEFAULT_MAX_CONTENT_CHARS: u32 = 4_000;
pub const DEFAULT_PILLAR_NAME: &str = "General";
pub const DEFAULT_PIPELINE_CONCURRENCY: u32 = 4;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CLAIM_LEASE_SECONDS: i64 = 60;
pub const DEFAULT_BASE_BACKOFF_MS: i64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: i64 = 30_000;
pub const DEFAULT_SCORE_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_ASSIGN_MAX_ATTEMPTS: i32 = 10;
pub const DEFAULT_SYNTHESIS_MAX_ATTEMPTS: i32 = 8;
pub const DEFAULT_PURGE_DONE_AFTER_HOURS: i64 = 72;
pub const DEFAULT_RETENTION_KEEP_RECENT: u32 = 30;
pub const DEFAULT_RETENTION_MIN_AGE_DAYS: u32 = 90;
pub const DEFAULT_RETENTION_INTERVAL_SECONDS: u64 = 3_600;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub clustering: Clustering,
	#[serde(default)]
	pub snapshots: Snapshots,
	#[serde(default)]
	pub metrics: Metrics,
	#[serde(default)]
	pub ingestion: Ingestion,
	#[serde(default)]
	pub pipeline: Pipeline,
	#[serde(default)]
	pub retention: Retention,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	/// Chat model that grades a note against its author's domain.
	pub relevance: LlmProviderConfig,
	/// Chat model that writes the executive synthesis of a cluster.
	pub synthesis: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Clustering {
	pub vector_dim: u32,
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Snapshots {
	pub member_step: u32,
	pub time_floor_hours: u32,
	pub evidence_limit: u32,
	pub sweep_interval_seconds: u64,
}
impl Default for Snapshots {
	fn default() -> Self {
		Self {
			member_step: DEFAULT_SNAPSHOT_MEMBER_STEP,
			time_floor_hours: DEFAULT_SNAPSHOT_TIME_FLOOR_HOURS,
			evidence_limit: DEFAULT_SNAPSHOT_EVIDENCE_LIMIT,
			sweep_interval_seconds: DEFAULT_SNAPSHOT_SWEEP_INTERVAL_SECONDS,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
	pub velocity_window_hours: u32,
}
impl Default for Metrics {
	fn default() -> Self {
		Self { velocity_window_hours: DEFAULT_VELOCITY_WINDOW_HOURS }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ingestion {
	pub max_content_chars: u32,
	pub default_pillar_name: String,
}
impl Default for Ingestion {
	fn default() -> Self {
		Self {
			max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
			default_pillar_name: DEFAULT_PILLAR_NAME.to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	pub concurrency: u32,
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub score_max_attempts: i32,
	pub assign_max_attempts: i32,
	pub synthesis_max_attempts: i32,
	pub purge_done_after_hours: i64,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self {
			concurrency: DEFAULT_PIPELINE_CONCURRENCY,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			claim_lease_seconds: DEFAULT_CLAIM_LEASE_SECONDS,
			base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
			max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
			score_max_attempts: DEFAULT_SCORE_MAX_ATTEMPTS,
			assign_max_attempts: DEFAULT_ASSIGN_MAX_ATTEMPTS,
			synthesis_max_attempts: DEFAULT_SYNTHESIS_MAX_ATTEMPTS,
			purge_done_after_hours: DEFAULT_PURGE_DONE_AFTER_HOURS,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retention {
	pub enabled: bool,
	pub keep_recent: u32,
	pub min_age_days: u32,
	pub interval_seconds: u64,
}
impl Default for Retention {
	fn default() -> Self {
		Self {
			enabled: false,
			keep_recent: DEFAULT_RETENTION_KEEP_RECENT,
			min_age_days: DEFAULT_RETENTION_MIN_AGE_DAYS,
			interval_seconds: DEFAULT_RETENTION_INTERVAL_SECONDS,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}

fn default_similarity_threshold() -> f32 {
	DEFAULT_SIMILARITY_THRESHOLD
}
