pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_pillars.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_pillars.sql")),
				"tables/002_clusters.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_clusters.sql")),
				"tables/003_notes.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_notes.sql")),
				"tables/004_cluster_snapshots.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_cluster_snapshots.sql")),
				"tables/005_snapshot_evidence.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_snapshot_evidence.sql")),
				"tables/006_cluster_syntheses.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_cluster_syntheses.sql")),
				"tables/007_pipeline_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_pipeline_jobs.sql")),
				"tables/008_snapshot_range_summaries.sql" => out
					.push_str(include_str!("../../../sql/tables/008_snapshot_range_summaries.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
