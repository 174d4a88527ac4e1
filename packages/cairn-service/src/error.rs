pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	/// A write would have crossed an organization boundary or double-assigned a note. The
	/// surrounding transaction is always rolled back.
	#[error("Consistency violation: {message}")]
	ConsistencyViolation { message: String },
	#[error("Transient service error: {message}")]
	TransientService { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Whether a background job that failed with this error may be retried.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::TransientService { .. } | Self::Storage { .. })
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<cairn_storage::Error> for Error {
	fn from(err: cairn_storage::Error) -> Self {
		match err {
			cairn_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			cairn_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			cairn_storage::Error::NotFound(message) => Self::NotFound { message },
			cairn_storage::Error::Conflict(message) => Self::InvalidRequest { message },
		}
	}
}

impl From<cairn_domain::Error> for Error {
	fn from(err: cairn_domain::Error) -> Self {
		match err {
			cairn_domain::Error::CrossOrgReference { .. } =>
				Self::ConsistencyViolation { message: err.to_string() },
			other => Self::InvalidRequest { message: other.to_string() },
		}
	}
}

impl From<cairn_providers::Error> for Error {
	fn from(err: cairn_providers::Error) -> Self {
		Self::TransientService { message: err.to_string() }
	}
}
