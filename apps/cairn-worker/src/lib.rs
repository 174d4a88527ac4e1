pub mod worker;

mod error;

pub use error::{Error, Result};

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cairn_cli::ConfigArgs;
use cairn_service::CairnService;
use cairn_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = cairn_cli::VERSION,
	rename_all = "kebab",
	styles = cairn_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cairn_config::load(&args.config.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.clustering.vector_dim).await?;

	let service = CairnService::new(config, db);

	worker::run_worker(Arc::new(service)).await?;

	Ok(())
}
