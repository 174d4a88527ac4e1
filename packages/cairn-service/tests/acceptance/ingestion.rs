use uuid::Uuid;

use cairn_domain::status::NoteStatus;
use cairn_service::{CreatePillarRequest, Error, IngestRequest};

use super::{StubEnrichment, SwitchableSynthesis};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn idempotency_key_replays_the_original_note() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping idempotency_key_replays_the_original_note; set CAIRN_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let request = IngestRequest {
		idempotency_key: Some("form-submit-42".to_string()),
		..super::note_request(org_id, "Publish the roadmap quarterly.")
	};
	let first = service.ingest(request.clone()).await.expect("First ingest failed.");
	let second = service.ingest(request).await.expect("Replayed ingest failed.");

	assert!(!first.replayed);
	assert!(second.replayed);
	assert_eq!(first.note_id, second.note_id);
	assert_eq!(first.status, NoteStatus::Queued);

	let runs = super::drain(&service).await;

	// One score, one assign and one synthesis job for the single note.
	assert_eq!(runs, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn notes_without_a_pillar_land_in_the_default_pillar() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping notes_without_a_pillar_land_in_the_default_pillar; set CAIRN_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let first = service
		.ingest(super::note_request(org_id, "Rotate staging credentials."))
		.await
		.expect("Ingest failed.");
	let second = service
		.ingest(super::note_request(org_id, "Document the release train."))
		.await
		.expect("Ingest failed.");

	assert_eq!(first.pillar_id, second.pillar_id);

	let pillars = service.list_pillars(org_id).await.expect("Listing pillars failed.");

	assert_eq!(pillars.len(), 1);
	assert_eq!(pillars[0].name, "General");

	let duplicate = service
		.create_pillar(CreatePillarRequest { org_id, name: "general".to_string() })
		.await
		.expect_err("Pillar names are unique per organization.");

	assert!(matches!(duplicate, Error::InvalidRequest { .. }), "Unexpected error: {duplicate:?}");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn invalid_notes_are_rejected_before_storage() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping invalid_notes_are_rejected_before_storage; set CAIRN_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let blank = service
		.ingest(super::note_request(org_id, "   "))
		.await
		.expect_err("Blank content must be rejected.");

	assert!(matches!(blank, Error::InvalidRequest { .. }));

	let mut anonymous = super::note_request(org_id, "Give interns a buddy.");

	anonymous.author_context.job_title = " ".to_string();

	let err = service.ingest(anonymous).await.expect_err("Empty job title must be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(service.list_pillars(org_id).await.expect("Listing pillars failed.").is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
