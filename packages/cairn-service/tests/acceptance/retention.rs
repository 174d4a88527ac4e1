use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cairn_domain::{retention::KeepRecentPolicy, status::ClusterStatus};

use super::{StubEnrichment, SwitchableSynthesis};

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn retention_folds_old_snapshots_into_ranges() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping retention_folds_old_snapshots_into_ranges; set CAIRN_PG_DSN to run.");

		return;
	};
	let mut cfg = super::test_config(test_db.dsn().to_string());

	cfg.snapshots.member_step = 1;

	let service = super::build_service(
		cfg,
		super::providers(StubEnrichment::new(&[]), SwitchableSynthesis::healthy()),
	)
	.await;
	let org_id = Uuid::new_v4();
	let mut note_ids = Vec::new();

	for content in ["Archive stale tickets.", "Close stale tickets.", "Auto-close stale tickets."]
	{
		let note =
			service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");

		note_ids.push(note.note_id);

		super::drain(&service).await;
	}

	let cluster_id = service
		.get_note(org_id, note_ids[0])
		.await
		.expect("Read failed.")
		.cluster_id
		.expect("Note must be assigned.");
	let now = OffsetDateTime::now_utc();
	let untouched = service.apply_retention(now).await.expect("Retention failed.");

	assert_eq!(untouched.summaries_written, 0, "Default policy keeps young snapshots.");

	let policy = KeepRecentPolicy { keep_recent: 1, min_age: Duration::ZERO };
	let report = service.apply_retention_with(&policy, now).await.expect("Retention failed.");

	assert_eq!(report.clusters_examined, 1);
	assert_eq!(report.summaries_written, 1);
	assert_eq!(report.snapshots_deleted, 0, "Active clusters keep their snapshot rows.");

	let history = service.cluster_history(org_id, cluster_id).await.expect("History failed.");

	assert_eq!(history.ranges.len(), 1);
	assert_eq!(history.ranges[0].first_sequence, 1);
	assert_eq!(history.ranges[0].last_sequence, 2);
	assert_eq!(history.ranges[0].snapshot_count, 2);
	assert_eq!(
		history.snapshots.iter().map(|s| s.sequence_number).collect::<Vec<_>>(),
		vec![3]
	);

	for note_id in &note_ids {
		service.retract_note(org_id, *note_id).await.expect("Retraction failed.");
	}

	let cluster = service.get_cluster(org_id, cluster_id).await.expect("Read failed.");

	assert_eq!(cluster.status, ClusterStatus::Archived);

	let cleanup = service.apply_retention_with(&policy, now).await.expect("Retention failed.");

	assert_eq!(cleanup.snapshots_deleted, 2);

	let archived = service.cluster_history(org_id, cluster_id).await.expect("History failed.");

	assert_eq!(archived.ranges.len(), 1);
	assert_eq!(archived.snapshots.len(), 1);
	assert_eq!(archived.snapshots[0].sequence_number, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
