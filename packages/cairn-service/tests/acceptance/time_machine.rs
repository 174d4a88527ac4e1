use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use cairn_service::{Error, ListClustersRequest};

use super::{StubEnrichment, SwitchableSynthesis};

const NOTES: [&str; 3] =
	["Batch small PRs.", "Review PRs within a day.", "Pair on large PR reviews."];

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn history_and_present_follow_member_step_snapshots() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping history_and_present_follow_member_step_snapshots; set CAIRN_PG_DSN.");

		return;
	};
	let axis = vec![1.0, 0.0, 0.0];
	let enrichment = StubEnrichment::new(&[
		(NOTES[0], axis.clone(), 4),
		(NOTES[1], axis.clone(), 9),
		(NOTES[2], axis, 6),
	]);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(enrichment, SwitchableSynthesis::healthy()))
			.await;
	let org_id = Uuid::new_v4();
	let mut note_ids = Vec::new();

	for content in NOTES {
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
	let history = service.cluster_history(org_id, cluster_id).await.expect("History failed.");
	let sequences: Vec<i64> = history.snapshots.iter().map(|s| s.sequence_number).collect();
	let triggers: Vec<&str> = history.snapshots.iter().map(|s| s.trigger.as_str()).collect();

	assert!(history.ranges.is_empty());
	assert_eq!(sequences, vec![1, 2]);
	assert_eq!(triggers, vec!["created", "member_step"]);

	let second = &history.snapshots[1];
	let evidence: Vec<Uuid> = second.evidence.iter().map(|e| e.note_id).collect();

	assert_eq!(second.metrics.member_count, 3);
	assert_eq!(evidence, vec![note_ids[1], note_ids[2], note_ids[0]]);
	assert_eq!(second.evidence[0].rank, 0);
	assert_eq!(second.evidence[0].relevance_score, 9);

	let present = service.present(org_id, cluster_id).await.expect("Present failed.");
	let latest = present.snapshot.expect("Present view must carry the latest snapshot.");

	assert_eq!(latest.sequence_number, 2);
	assert_eq!(present.live_metrics.member_count, 3);
	assert!((present.live_metrics.avg_relevance - 19.0 / 3.0).abs() < 1e-9);

	let fetched = service.get_snapshot(org_id, latest.snapshot_id).await.expect("Fetch failed.");

	assert_eq!(fetched.sequence_number, 2);
	assert!(matches!(
		service.get_snapshot(Uuid::new_v4(), latest.snapshot_id).await,
		Err(Error::NotFound { .. })
	));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn cluster_listings_filter_by_relevance() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping cluster_listings_filter_by_relevance; set CAIRN_PG_DSN to run this test.");

		return;
	};
	let enrichment = StubEnrichment::new(&[
		("Hold blameless postmortems.", vec![1.0, 0.0, 0.0], 9),
		("Repaint the lobby.", vec![0.0, 1.0, 0.0], 2),
	]);
	let cfg = super::test_config(test_db.dsn().to_string());
	let service =
		super::build_service(cfg, super::providers(enrichment, SwitchableSynthesis::healthy()))
			.await;
	let org_id = Uuid::new_v4();

	for content in ["Hold blameless postmortems.", "Repaint the lobby."] {
		service.ingest(super::note_request(org_id, content)).await.expect("Ingest failed.");
	}

	super::drain(&service).await;

	let request = |min_relevance| ListClustersRequest {
		org_id,
		pillar_id: None,
		min_relevance,
		include_archived: false,
	};
	let all = service.list_clusters(request(None)).await.expect("Listing failed.");
	let relevant = service.list_clusters(request(Some(5.0))).await.expect("Listing failed.");

	assert_eq!(all.len(), 2);
	assert_eq!(relevant.len(), 1);
	assert_eq!(relevant[0].volume, 1);
	assert!((relevant[0].avg_relevance - 9.0).abs() < 1e-9);

	let err = service
		.list_clusters(request(Some(11.0)))
		.await
		.expect_err("Out of range thresholds must be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CAIRN_PG_DSN to run."]
async fn sweep_snapshots_quiet_clusters_past_the_time_floor() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping time-floor sweep test; set CAIRN_PG_DSN to run this test.");

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

	for content in ["Publish the roadmap quarterly.", "Share roadmap updates each quarter."] {
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

	assert_eq!(service.sweep_time_floor(now).await.expect("Sweep failed.").captured, 0);

	// Age the creation snapshot past the 24 hour floor; the second member joined after it.
	sqlx::query(
		"UPDATE cluster_snapshots SET captured_at = captured_at - interval '25 hours' \
		 WHERE cluster_id = $1",
	)
	.bind(cluster_id)
	.execute(&service.db.pool)
	.await
	.expect("Failed to age snapshots.");

	let report = service.sweep_time_floor(now).await.expect("Sweep failed.");

	assert_eq!(report.examined, 1);
	assert_eq!(report.captured, 1);

	let history = service.cluster_history(org_id, cluster_id).await.expect("History failed.");
	let sequences: Vec<i64> = history.snapshots.iter().map(|s| s.sequence_number).collect();
	let triggers: Vec<&str> = history.snapshots.iter().map(|s| s.trigger.as_str()).collect();

	assert_eq!(sequences, vec![1, 2]);
	assert_eq!(triggers, vec!["created", "time_floor"]);
	assert_eq!(history.snapshots[1].metrics.member_count, 2);

	// Nothing joined since the sweep snapshot.
	let later = now + Duration::hours(30);

	assert_eq!(service.sweep_time_floor(later).await.expect("Sweep failed.").captured, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
