use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cairn_config::LlmProviderConfig;
use cairn_domain::status::{JobStatus, NoteStatus};
use cairn_providers::completion::ChatMessage;
use cairn_service::{
	BoxFuture, Enrichment, EnrichmentProvider, EnrichmentRequest, Providers, SynthesisProvider,
};
use cairn_storage::queue;

use super::{StubEnrichment, SwitchableSynthesis};

struct UnreachableEnrichment;
impl EnrichmentProvider for UnreachableEnrichment {
	fn enrich<'a>(
		&'a self,
		_cfg: &'a cairn_config::Providers,
		_req: &'a EnrichmentRequest,
	) -> BoxFuture<'a, cairn_providers::Result<Enrichment>> {
		Box::pin(async {
			Err(cairn_providers::Error::InvalidResponse {
				message: "Relevance provider rejected api_key=sk-test-123.".to_string(),
			})
		})
	}
}

struct UnusedSynthesis;
impl SynthesisProvider for UnusedSynthesis {
	fn synthesize<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [ChatMessage],
		_request_id: &'a str,
	) -> BoxFuture<'a, cairn_providers::Result<String>> {
		Box::pin(async { Ok(String::new()) })
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn exhausted_scoring_moves_the_note_to_manual_review() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping exhausted_scoring_moves_the_note_to_manual_review; set CAIRN_PG_DSN.");

		return;
	};
	let mut cfg = super::test_config(test_db.dsn().to_string());

	cfg.pipeline.base_backoff_ms = 0;
	cfg.pipeline.max_backoff_ms = 0;
	cfg.pipeline.score_max_attempts = 2;

	let providers = Providers::new(Arc::new(UnreachableEnrichment), Arc::new(UnusedSynthesis));
	let service = super::build_service(cfg, providers).await;
	let org_id = Uuid::new_v4();
	let note = service
		.ingest(super::note_request(org_id, "Budget for conference travel."))
		.await
		.expect("Ingest failed.");
	let first = service.run_next_job().await.expect("Job run failed.").expect("Job must run.");

	assert_eq!(first.status, JobStatus::Failed);
	assert_eq!(
		service.get_note(org_id, note.note_id).await.expect("Read failed.").status,
		NoteStatus::PendingEnrichment
	);

	let second = service.run_next_job().await.expect("Job run failed.").expect("Job must run.");

	assert_eq!(second.status, JobStatus::Dead);
	assert_eq!(second.attempts, 2);
	assert!(service.run_next_job().await.expect("Job run failed.").is_none());

	let view = service.get_note(org_id, note.note_id).await.expect("Read failed.");

	assert_eq!(view.status, NoteStatus::ManualReview);
	assert_eq!(view.cluster_id, None);

	let job = queue::get_by_dedupe_key(&service.db.pool, &format!("score:{}", note.note_id))
		.await
		.expect("Lookup failed.")
		.expect("Dead jobs are kept.");
	let last_error = job.last_error.expect("Dead jobs record their error.");

	assert_eq!(job.status, "DEAD");
	assert!(last_error.contains("api_key=[REDACTED]"), "Unexpected error text: {last_error}");
	assert!(!last_error.contains("sk-test-123"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn finished_jobs_are_purged_after_the_grace_period() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping finished_jobs_are_purged_after_the_grace_period; set CAIRN_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let grace = cfg.pipeline.purge_done_after_hours;
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();

	service
		.ingest(super::note_request(org_id, "Standardize service dashboards."))
		.await
		.expect("Ingest failed.");

	assert_eq!(super::drain(&service).await, 3);

	let now = OffsetDateTime::now_utc();

	assert_eq!(service.purge_finished_jobs(now).await.expect("Purge failed."), 0);

	let later = now + Duration::hours(grace + 1);

	assert_eq!(service.purge_finished_jobs(later).await.expect("Purge failed."), 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
