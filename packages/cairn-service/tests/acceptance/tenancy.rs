use uuid::Uuid;

use cairn_service::{CreatePillarRequest, Error, IngestRequest};

use super::{StubEnrichment, SwitchableSynthesis};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn cross_org_references_are_rejected() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping cross_org_references_are_rejected; set CAIRN_PG_DSN to run this test.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_a = Uuid::new_v4();
	let org_b = Uuid::new_v4();
	let pillar = service
		.create_pillar(CreatePillarRequest { org_id: org_a, name: "Reliability".to_string() })
		.await
		.expect("Failed to create pillar.");
	let err = service
		.ingest(IngestRequest {
			pillar_id: Some(pillar.pillar_id),
			..super::note_request(org_b, "Borrow another org's pillar.")
		})
		.await
		.expect_err("A pillar of another organization must be rejected.");

	assert!(matches!(err, Error::ConsistencyViolation { .. }), "Unexpected error: {err:?}");

	let own = service
		.ingest(IngestRequest {
			pillar_id: Some(pillar.pillar_id),
			..super::note_request(org_a, "Add SLO burn alerts.")
		})
		.await
		.expect("Ingest into own pillar failed.");

	super::drain(&service).await;

	let note = service.get_note(org_a, own.note_id).await.expect("Owner must see the note.");
	let cluster_id = note.cluster_id.expect("Note must be assigned.");

	assert!(matches!(service.get_note(org_b, own.note_id).await, Err(Error::NotFound { .. })));
	assert!(matches!(service.get_cluster(org_b, cluster_id).await, Err(Error::NotFound { .. })));
	assert!(matches!(
		service.retract_note(org_b, own.note_id).await,
		Err(Error::NotFound { .. })
	));
	assert!(
		service
			.list_clusters(cairn_service::ListClustersRequest {
				org_id: org_b,
				pillar_id: None,
				min_relevance: None,
				include_archived: true,
			})
			.await
			.expect("Listing clusters failed.")
			.is_empty()
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
