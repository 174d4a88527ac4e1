use uuid::Uuid;

use cairn_service::{AssignmentOutcome, ListClustersRequest};
use cairn_storage::clusters;

use super::{StubEnrichment, SwitchableSynthesis};

async fn score_and_assign(
	service: &cairn_service::CairnService,
	org_id: Uuid,
	content: &str,
) -> AssignmentOutcome {
	let ingested =
		service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");

	service.score_note(ingested.note_id).await.expect("Scoring failed.");

	let mut outcomes = service.assign_note(ingested.note_id).await.expect("Assignment failed.");

	assert_eq!(outcomes.len(), 1, "Only the scored note should be assigned.");

	outcomes.remove(0)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn notes_join_or_seed_clusters_by_similarity() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping notes_join_or_seed_clusters_by_similarity; set CAIRN_PG_DSN to run.");

		return;
	};
	let enrichment = StubEnrichment::new(&[
		("Cache warmup blocks deploys.", vec![1.0, 0.0, 0.0], 8),
		("Deploys wait on cold caches.", super::bent(0.81), 6),
		("The cafeteria needs more seating.", super::orthogonal_bent(0.40), 3),
	]);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(enrichment, SwitchableSynthesis::healthy()))
			.await;
	let org_id = Uuid::new_v4();
	let a = score_and_assign(&service, org_id, "Cache warmup blocks deploys.").await;

	assert!(a.created_cluster);
	assert_eq!(a.member_count, 1);
	assert_eq!(a.snapshot_sequence, Some(1));

	let b = score_and_assign(&service, org_id, "Deploys wait on cold caches.").await;

	assert!(!b.created_cluster);
	assert_eq!(b.cluster_id, a.cluster_id);
	assert_eq!(b.member_count, 2);
	assert!((b.similarity.expect("Join must report similarity.") - 0.81).abs() < 1e-4);
	assert_eq!(b.snapshot_sequence, None);

	let cluster = clusters::get_cluster(&service.db.pool, a.cluster_id)
		.await
		.expect("Failed to read cluster.")
		.expect("Cluster must exist.");
	let centroid = cluster.centroid_vec().expect("Centroid must parse.");
	let expected = super::bent(0.81);

	assert!((centroid[0] - (1.0 + expected[0]) / 2.0).abs() < 1e-5);
	assert!((centroid[1] - expected[1] / 2.0).abs() < 1e-5);
	assert!((cluster.avg_relevance - 7.0).abs() < 1e-9);

	let c = score_and_assign(&service, org_id, "The cafeteria needs more seating.").await;

	assert!(c.created_cluster);
	assert_ne!(c.cluster_id, a.cluster_id);
	assert_eq!(c.member_count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn assignment_replays_do_not_double_count() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping assignment_replays_do_not_double_count; set CAIRN_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let first = score_and_assign(&service, org_id, "Ship smaller releases.").await;

	service.score_note(first.note_id).await.expect("Scoring replay failed.");

	let replay = service.assign_note(first.note_id).await.expect("Assignment replay failed.");

	assert!(replay.is_empty());

	let cluster = service.get_cluster(org_id, first.cluster_id).await.expect("Read failed.");

	assert_eq!(cluster.member_count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn ready_notes_of_a_partition_are_assigned_in_arrival_order() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping arrival order test; set CAIRN_PG_DSN to run this test.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let older = service
		.ingest(super::note_request(org_id, "Automate on-call handover."))
		.await
		.expect("Ingest failed.");
	let newer = service
		.ingest(super::note_request(org_id, "Automate incident handover."))
		.await
		.expect("Ingest failed.");

	service.score_note(newer.note_id).await.expect("Scoring failed.");
	service.score_note(older.note_id).await.expect("Scoring failed.");

	let outcomes = service.assign_note(newer.note_id).await.expect("Assignment failed.");
	let order: Vec<Uuid> = outcomes.iter().map(|outcome| outcome.note_id).collect();

	assert_eq!(order, vec![older.note_id, newer.note_id]);
	assert!(outcomes[0].created_cluster);
	assert!(!outcomes[1].created_cluster);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn concurrent_assignments_in_one_partition_share_a_single_cluster() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping concurrent assignment test; set CAIRN_PG_DSN to run this test.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let mut note_ids = Vec::new();

	for content in
		["Nightly dependency audits.", "Audit dependencies nightly.", "Weekly dependency audits."]
	{
		let note =
			service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");

		service.score_note(note.note_id).await.expect("Scoring failed.");
		note_ids.push(note.note_id);
	}

	// Every note embeds to the same vector, so an unserialized partition would seed duplicates.
	let (first, second, third) = tokio::join!(
		service.assign_note(note_ids[0]),
		service.assign_note(note_ids[1]),
		service.assign_note(note_ids[2]),
	);
	let outcomes: Vec<AssignmentOutcome> = [first, second, third]
		.into_iter()
		.flat_map(|outcome| outcome.expect("Assignment failed."))
		.collect();
	let mut assigned: Vec<Uuid> = outcomes.iter().map(|outcome| outcome.note_id).collect();

	assigned.sort();
	note_ids.sort();

	assert_eq!(assigned, note_ids, "Each note must be assigned exactly once.");
	assert_eq!(outcomes.iter().filter(|outcome| outcome.created_cluster).count(), 1);

	let listed = service
		.list_clusters(ListClustersRequest {
			org_id,
			pillar_id: None,
			min_relevance: None,
			include_archived: true,
		})
		.await
		.expect("Listing failed.");

	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].volume, 3);

	let cluster = service.get_cluster(org_id, listed[0].cluster_id).await.expect("Read failed.");

	assert_eq!(cluster.member_count, 3);
	assert_eq!(cluster.revision, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
