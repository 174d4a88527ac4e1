pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] cairn_config::Error),
	#[error(transparent)]
	Storage(#[from] cairn_storage::Error),
	#[error(transparent)]
	Service(#[from] cairn_service::Error),
	#[error("Worker task stopped unexpectedly: {0}.")]
	Join(#[from] tokio::task::JoinError),
}
