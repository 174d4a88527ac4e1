use std::sync::atomic::Ordering;

use uuid::Uuid;

use cairn_service::SynthesisOutcome;
use cairn_storage::queue;

use super::{GatedSynthesis, StubEnrichment, SwitchableSynthesis};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn failed_synthesis_keeps_the_previous_text() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping failed_synthesis_keeps_the_previous_text; set CAIRN_PG_DSN to run.");

		return;
	};
	let synthesis = SwitchableSynthesis::healthy();
	let failing = synthesis.failing.clone();
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(StubEnrichment::new(&[]), synthesis)).await;
	let org_id = Uuid::new_v4();
	let first = service
		.ingest(super::note_request(org_id, "Keep a public changelog."))
		.await
		.expect("Ingest failed.");

	super::drain(&service).await;

	let cluster_id = service
		.get_note(org_id, first.note_id)
		.await
		.expect("Read failed.")
		.cluster_id
		.expect("Note must be assigned.");
	let before = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(before.synthesis_text, Some(format!("Synthesis for {cluster_id}:1.")));

	failing.store(true, Ordering::SeqCst);
	service
		.ingest(super::note_request(org_id, "Changelog entries for every release."))
		.await
		.expect("Ingest failed.");
	super::drain(&service).await;

	let after = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(after.member_count, 2);
	assert_eq!(after.revision, 2);
	assert_eq!(after.synthesis_text, before.synthesis_text);

	let job = queue::get_by_dedupe_key(&service.db.pool, &format!("synthesize:{cluster_id}:2"))
		.await
		.expect("Lookup failed.")
		.expect("Synthesis job must exist.");

	assert_eq!(job.status, "FAILED");
	assert_eq!(job.attempts, 1);
	assert!(job.last_error.as_deref().is_some_and(|err| err.contains("unavailable")));

	failing.store(false, Ordering::SeqCst);

	let applied = service.synthesize_cluster(cluster_id, 2).await.expect("Synthesis failed.");
	let stale = service.synthesize_cluster(cluster_id, 1).await.expect("Replay failed.");

	assert_eq!(applied, SynthesisOutcome::Applied);
	assert_eq!(stale, SynthesisOutcome::AlreadyCurrent);

	let current = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(current.synthesis_text, Some(format!("Synthesis for {cluster_id}:2.")));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn superseded_revisions_skip_the_provider() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping superseded_revisions_skip_the_provider; set CAIRN_PG_DSN to run.");

		return;
	};
	let synthesis = SwitchableSynthesis::healthy();
	let calls = synthesis.calls.clone();
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(StubEnrichment::new(&[]), synthesis)).await;
	let org_id = Uuid::new_v4();

	for content in ["Trim the CI matrix.", "Cache CI dependencies.", "Split slow CI suites."] {
		let note =
			service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");

		service.score_note(note.note_id).await.expect("Scoring failed.");
		service.assign_note(note.note_id).await.expect("Assignment failed.");
	}

	super::drain(&service).await;

	// Revisions 1 and 2 were superseded before their jobs ran.
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn results_overtaken_by_a_retraction_are_not_published() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping stale synthesis test; set CAIRN_PG_DSN to run this test.");

		return;
	};
	let synthesis = GatedSynthesis::new();
	let entered = synthesis.entered.clone();
	let release = synthesis.release.clone();
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(StubEnrichment::new(&[]), synthesis)).await;
	let org_id = Uuid::new_v4();
	let mut note_ids = Vec::new();

	for content in ["Rotate the on-call pager weekly.", "Shorter on-call shifts."] {
		let note =
			service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");

		service.score_note(note.note_id).await.expect("Scoring failed.");
		service.assign_note(note.note_id).await.expect("Assignment failed.");
		note_ids.push(note.note_id);
	}

	let cluster_id = service
		.get_note(org_id, note_ids[0])
		.await
		.expect("Read failed.")
		.cluster_id
		.expect("Note must be assigned.");
	let retract_while_in_flight = async {
		entered.notified().await;

		let retracted =
			service.retract_note(org_id, note_ids[1]).await.expect("Retraction failed.");

		release.notify_one();

		retracted
	};
	let (outcome, retracted) =
		tokio::join!(service.synthesize_cluster(cluster_id, 2), retract_while_in_flight);

	assert_eq!(retracted.member_count, Some(1));
	assert_eq!(outcome.expect("Synthesis failed."), SynthesisOutcome::Superseded);

	let cluster = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(cluster.revision, 3);
	assert_eq!(cluster.synthesis_text, None);

	// The next call is let through without waiting.
	release.notify_one();

	let current = service.synthesize_cluster(cluster_id, 3).await.expect("Synthesis failed.");

	assert_eq!(current, SynthesisOutcome::Applied);

	let cluster = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(cluster.synthesis_text, Some(format!("Synthesis for {cluster_id}:3.")));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
