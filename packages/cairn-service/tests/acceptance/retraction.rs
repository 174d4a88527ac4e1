use uuid::Uuid;

use cairn_domain::status::{ClusterStatus, NoteStatus};
use cairn_storage::clusters;

use super::{StubEnrichment, SwitchableSynthesis};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn retraction_restores_the_remaining_centroid_exactly() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping retraction_restores_the_remaining_centroid_exactly; set CAIRN_PG_DSN.");

		return;
	};
	let e1 = vec![1.0, 0.0, 0.0];
	let enrichment = StubEnrichment::new(&[
		("Cache warmup blocks deploys.", e1.clone(), 8),
		("Deploys wait on cold caches.", super::bent(0.81), 6),
	]);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(enrichment, SwitchableSynthesis::healthy()))
			.await;
	let org_id = Uuid::new_v4();
	let a = service
		.ingest(super::note_request(org_id, "Cache warmup blocks deploys."))
		.await
		.expect("Ingest failed.");
	let b = service
		.ingest(super::note_request(org_id, "Deploys wait on cold caches."))
		.await
		.expect("Ingest failed.");

	service.score_note(a.note_id).await.expect("Scoring failed.");
	service.score_note(b.note_id).await.expect("Scoring failed.");
	service.assign_note(b.note_id).await.expect("Assignment failed.");

	// Synthesis for the two-member revision has not run yet.
	let retracted = service.retract_note(org_id, b.note_id).await.expect("Retraction failed.");
	let cluster_id = retracted.cluster_id.expect("Retraction must report the cluster.");

	assert_eq!(retracted.status, NoteStatus::Retracted);
	assert_eq!(retracted.member_count, Some(1));
	assert_eq!(retracted.cluster_status, Some(ClusterStatus::Active));

	let cluster = clusters::get_cluster(&service.db.pool, cluster_id)
		.await
		.expect("Failed to read cluster.")
		.expect("Cluster must exist.");

	assert_eq!(cluster.member_count, 1);
	assert_eq!(cluster.centroid_vec().expect("Centroid must parse."), e1);
	assert!((cluster.avg_relevance - 8.0).abs() < 1e-9);

	let again = service.retract_note(org_id, b.note_id).await.expect("Replay failed.");

	assert_eq!(again.cluster_id, None);

	super::drain(&service).await;

	let view = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(view.member_count, 1);
	assert_eq!(view.synthesis_text, Some(format!("Synthesis for {cluster_id}:{}.", view.revision)));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn retracting_the_last_member_archives_the_cluster() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping retracting_the_last_member_archives_the_cluster; set CAIRN_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let note = service
		.ingest(super::note_request(org_id, "Sunset the legacy wiki."))
		.await
		.expect("Ingest failed.");

	super::drain(&service).await;

	let retracted = service.retract_note(org_id, note.note_id).await.expect("Retraction failed.");

	assert_eq!(retracted.cluster_status, Some(ClusterStatus::Archived));
	assert_eq!(retracted.member_count, Some(0));

	let cluster_id = retracted.cluster_id.expect("Retraction must report the cluster.");
	let view = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(view.status, ClusterStatus::Archived);
	assert!(view.archived_at.is_some());

	let history = service.cluster_history(org_id, cluster_id).await.expect("History failed.");

	assert_eq!(history.snapshots.len(), 1, "Archived clusters keep their history.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn unassigned_notes_drop_out_of_the_pipeline() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping unassigned_notes_drop_out_of_the_pipeline; set CAIRN_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let note = service
		.ingest(super::note_request(org_id, "Publish on-call metrics."))
		.await
		.expect("Ingest failed.");
	let retracted = service.retract_note(org_id, note.note_id).await.expect("Retraction failed.");

	assert_eq!(retracted.cluster_id, None);

	super::drain(&service).await;

	let view = service.get_note(org_id, note.note_id).await.expect("Read failed.");

	assert_eq!(view.status, NoteStatus::Retracted);
	assert_eq!(view.cluster_id, None);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
