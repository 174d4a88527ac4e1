use std::sync::Arc;

use cairn_service::CairnService;
use cairn_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<CairnService>,
}
impl AppState {
	pub async fn new(config: cairn_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.clustering.vector_dim).await?;

		Ok(Self::from_service(CairnService::new(config, db)))
	}

	pub fn from_service(service: CairnService) -> Self {
		Self { service: Arc::new(service) }
	}
}
