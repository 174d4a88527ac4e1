use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;
use cairn_service::{
	ClusterSummary, ClusterView, CreatePillarRequest, Error as ServiceError, HistoryResponse,
	IngestRequest, IngestResponse, ListClustersRequest, NoteView, PillarView, PresentView,
	RetentionReport, RetractResponse, SnapshotView, SweepReport,
};

/// Organization scope of a read or write.
#[derive(Debug, Deserialize)]
pub struct OrgScope {
	pub org_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PurgeReport {
	pub purged: u64,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/notes", post(ingest_note))
		.route("/v1/notes/{note_id}", get(get_note))
		.route("/v1/notes/{note_id}/retract", post(retract_note))
		.route("/v1/pillars", post(create_pillar).get(list_pillars))
		.route("/v1/clusters", get(list_clusters))
		.route("/v1/clusters/{cluster_id}", get(get_cluster))
		.route("/v1/clusters/{cluster_id}/history", get(cluster_history))
		.route("/v1/clusters/{cluster_id}/present", get(present))
		.route("/v1/snapshots/{snapshot_id}", get(get_snapshot))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/snapshots/sweep", post(sweep_snapshots))
		.route("/v1/admin/retention/apply", post(apply_retention))
		.route("/v1/admin/jobs/purge", post(purge_jobs))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn ingest_note(
	State(state): State<AppState>,
	Json(payload): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
	let response = state.service.ingest(payload).await?;
	let status = if response.replayed { StatusCode::OK } else { StatusCode::ACCEPTED };

	Ok((status, Json(response)))
}

async fn get_note(
	State(state): State<AppState>,
	Path(note_id): Path<Uuid>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<NoteView>, ApiError> {
	Ok(Json(state.service.get_note(scope.org_id, note_id).await?))
}

async fn retract_note(
	State(state): State<AppState>,
	Path(note_id): Path<Uuid>,
	Json(scope): Json<OrgScope>,
) -> Result<Json<RetractResponse>, ApiError> {
	Ok(Json(state.service.retract_note(scope.org_id, note_id).await?))
}

async fn create_pillar(
	State(state): State<AppState>,
	Json(payload): Json<CreatePillarRequest>,
) -> Result<(StatusCode, Json<PillarView>), ApiError> {
	let pillar = state.service.create_pillar(payload).await?;

	Ok((StatusCode::CREATED, Json(pillar)))
}

async fn list_pillars(
	State(state): State<AppState>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<Vec<PillarView>>, ApiError> {
	Ok(Json(state.service.list_pillars(scope.org_id).await?))
}

async fn list_clusters(
	State(state): State<AppState>,
	Query(query): Query<ListClustersRequest>,
) -> Result<Json<Vec<ClusterSummary>>, ApiError> {
	Ok(Json(state.service.list_clusters(query).await?))
}

async fn get_cluster(
	State(state): State<AppState>,
	Path(cluster_id): Path<Uuid>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<ClusterView>, ApiError> {
	Ok(Json(state.service.get_cluster(scope.org_id, cluster_id).await?))
}

async fn cluster_history(
	State(state): State<AppState>,
	Path(cluster_id): Path<Uuid>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<HistoryResponse>, ApiError> {
	Ok(Json(state.service.cluster_history(scope.org_id, cluster_id).await?))
}

async fn present(
	State(state): State<AppState>,
	Path(cluster_id): Path<Uuid>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<PresentView>, ApiError> {
	Ok(Json(state.service.present(scope.org_id, cluster_id).await?))
}

async fn get_snapshot(
	State(state): State<AppState>,
	Path(snapshot_id): Path<Uuid>,
	Query(scope): Query<OrgScope>,
) -> Result<Json<SnapshotView>, ApiError> {
	Ok(Json(state.service.get_snapshot(scope.org_id, snapshot_id).await?))
}

async fn sweep_snapshots(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
	Ok(Json(state.service.sweep_time_floor(OffsetDateTime::now_utc()).await?))
}

async fn apply_retention(
	State(state): State<AppState>,
) -> Result<Json<RetentionReport>, ApiError> {
	Ok(Json(state.service.apply_retention(OffsetDateTime::now_utc()).await?))
}

async fn purge_jobs(State(state): State<AppState>) -> Result<Json<PurgeReport>, ApiError> {
	let purged = state.service.purge_finished_jobs(OffsetDateTime::now_utc()).await?;

	Ok(Json(PurgeReport { purged }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
			ServiceError::ConsistencyViolation { message } => {
				tracing::warn!(error = %message, "Request rejected as a consistency violation.");

				json_error(StatusCode::CONFLICT, "CONSISTENCY_VIOLATION", message, None)
			},
			ServiceError::TransientService { message } => {
				tracing::warn!(error = %message, "Request failed on a transient dependency.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "TRANSIENT_SERVICE", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Request failed in storage.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"STORAGE",
					"Internal storage error.",
					None,
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
