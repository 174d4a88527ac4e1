pub mod assignment;
pub mod ingest;
pub mod notes;
pub mod pillars;
pub mod pipeline;
pub mod retention;
pub mod retraction;
pub mod scoring;
pub mod snapshots;
pub mod synthesis;
pub mod time_machine;
pub mod time_serde;

mod error;
mod partition;

use std::{future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

pub use assignment::AssignmentOutcome;
use cairn_config::{Config, Providers as ProviderConfigs};
use cairn_domain::{author::AuthorContext, relevance::RelevanceScore};
use cairn_providers::{
	completion::{self, ChatMessage},
	embedding,
};
use cairn_storage::db::Db;
pub use error::{Error, Result};
pub use ingest::{IngestRequest, IngestResponse};
pub use notes::NoteView;
pub use pillars::{CreatePillarRequest, PillarView};
pub use pipeline::JobRun;
pub use retention::RetentionReport;
pub use retraction::RetractResponse;
pub use snapshots::{CapturedSnapshot, SweepReport};
pub use synthesis::SynthesisOutcome;
pub use time_machine::{
	ClusterSummary, ClusterView, EvidenceView, HistoryResponse, ListClustersRequest,
	PresentView, RangeView, SnapshotView,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the scorer sends to the external enrichment service for one note.
#[derive(Clone, Debug)]
pub struct EnrichmentRequest {
	pub note_id: Uuid,
	pub content: String,
	pub author: AuthorContext,
	/// Stable per note and content, so provider retries are deduplicated.
	pub request_id: String,
}

/// Embedding and score for one note. Both arrive together or not at all.
#[derive(Clone, Debug)]
pub struct Enrichment {
	pub embedding: Vec<f32>,
	pub relevance_score: RelevanceScore,
	pub clarified_title: Option<String>,
	pub clarified_content: Option<String>,
}

pub trait EnrichmentProvider
where
	Self: Send + Sync,
{
	fn enrich<'a>(
		&'a self,
		cfg: &'a ProviderConfigs,
		req: &'a EnrichmentRequest,
	) -> BoxFuture<'a, cairn_providers::Result<Enrichment>>;
}

pub trait SynthesisProvider
where
	Self: Send + Sync,
{
	fn synthesize<'a>(
		&'a self,
		cfg: &'a cairn_config::LlmProviderConfig,
		messages: &'a [ChatMessage],
		request_id: &'a str,
	) -> BoxFuture<'a, cairn_providers::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub enrichment: Arc<dyn EnrichmentProvider>,
	pub synthesis: Arc<dyn SynthesisProvider>,
}
impl Providers {
	pub fn new(
		enrichment: Arc<dyn EnrichmentProvider>,
		synthesis: Arc<dyn SynthesisProvider>,
	) -> Self {
		Self { enrichment, synthesis }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { enrichment: provider.clone(), synthesis: provider }
	}
}

pub struct CairnService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}
impl CairnService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}

struct DefaultProviders;
impl EnrichmentProvider for DefaultProviders {
	fn enrich<'a>(
		&'a self,
		cfg: &'a ProviderConfigs,
		req: &'a EnrichmentRequest,
	) -> BoxFuture<'a, cairn_providers::Result<Enrichment>> {
		Box::pin(async move {
			let texts = [req.content.clone()];
			let mut vectors =
				embedding::embed(&cfg.embedding, &texts, Some(req.request_id.as_str())).await?;
			let embedding = vectors.pop().ok_or_else(|| cairn_providers::Error::InvalidResponse {
				message: "Embedding response is empty.".to_string(),
			})?;
			let messages = scoring::relevance_messages(req);
			let graded =
				completion::complete_json(&cfg.relevance, &messages, Some(req.request_id.as_str()))
					.await?;

			Ok(scoring::parse_grading(embedding, &graded))
		})
	}
}
impl SynthesisProvider for DefaultProviders {
	fn synthesize<'a>(
		&'a self,
		cfg: &'a cairn_config::LlmProviderConfig,
		messages: &'a [ChatMessage],
		request_id: &'a str,
	) -> BoxFuture<'a, cairn_providers::Result<String>> {
		Box::pin(completion::complete_text(cfg, messages, Some(request_id)))
	}
}
