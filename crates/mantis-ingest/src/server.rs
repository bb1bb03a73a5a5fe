//! HTTP upload surface.
//!
//! All routes live under `/api`. Uploads are `multipart/form-data`; every
//! pipeline call runs on the blocking pool and is awaited before the
//! response is sent. Failures are always `{"error": "..."}` bodies.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use mantis_core::error::IngestError;
use mantis_core::models::{NewUser, SessionIdSource, UserRecord};
use mantis_runtime::pipeline::{IngestReport, IngestionPipeline};
use mantis_store::LinkTarget;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const MANTIS_FIELD: &str = "mantisFile";
pub const HEART_FIELD: &str = "heartCsv";
pub const HEART_RATE_FIELD: &str = "heartRateFile";
pub const SESSION_ID_FIELD: &str = "sessionId";

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
}

// ── Router ─────────────────────────────────────────────────────────────────────

pub fn router(pipeline: Arc<IngestionPipeline>) -> Router {
    let api = Router::new()
        .route("/upload", post(upload_surrogate))
        .route("/upload/device", post(upload_device))
        .route("/heart-rate", post(upload_heart_rate))
        .route("/users", get(list_users).post(create_user))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(addr: &str, pipeline: Arc<IngestionPipeline>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received; shutting down");
            }
        })
        .await?;
    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Ingest(IngestError),
    /// Malformed request envelope (bad multipart, bad JSON, bad form value).
    BadRequest(String),
    /// The blocking task panicked or was cancelled.
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl From<mantis_store::StoreError> for ApiError {
    fn from(err: mantis_store::StoreError) -> Self {
        ApiError::Ingest(err.into())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("ingestion task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ingest(err) => (
                StatusCode::from_u16(err.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("{} {}", status.as_u16(), message);
        } else {
            warn!("{} {}", status.as_u16(), message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Multipart collection ───────────────────────────────────────────────────────

/// Files and text fields from one multipart request.
#[derive(Debug, Default)]
struct UploadForm {
    files: HashMap<String, Bytes>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Drain `multipart`, keeping the named file fields as bytes and any
    /// other field as text. A file field sent twice, or a file part under a
    /// name this route does not read, is rejected.
    async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        file_fields: &[&str],
    ) -> ApiResult<Self> {
        let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let expected = file_fields.contains(&name.as_str());
            if !expected && field.file_name().is_some() {
                return Err(ApiError::BadRequest(format!(
                    "Unexpected file field '{name}'; expected one of: {}",
                    file_fields.join(", ")
                )));
            }
            if expected {
                if form.files.contains_key(&name) {
                    return Err(IngestError::DuplicateField(name).into());
                }
                let data = field.bytes().await?;
                form.files.insert(name, data);
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn require_file(&mut self, name: &str) -> ApiResult<Bytes> {
        self.files
            .remove(name)
            .ok_or_else(|| IngestError::InputMissing(name.to_string()).into())
    }

    fn session_id(&self) -> ApiResult<Option<i64>> {
        match self.fields.get(SESSION_ID_FIELD).map(|s| s.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ApiError::BadRequest(format!("{SESSION_ID_FIELD} '{raw}' is not an integer"))
            }),
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn upload_surrogate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    upload_mantis(state, multipart, SessionIdSource::Surrogate).await
}

async fn upload_device(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    upload_mantis(state, multipart, SessionIdSource::DeviceAssigned).await
}

async fn upload_mantis(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
    id_source: SessionIdSource,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    let mut form = UploadForm::read(multipart, &[MANTIS_FIELD, HEART_FIELD]).await?;
    let mantis = form.require_file(MANTIS_FIELD)?;
    let heart = form.files.remove(HEART_FIELD);

    let pipeline = Arc::clone(&state.pipeline);
    let report = tokio::task::spawn_blocking(move || {
        pipeline.ingest_mantis(&mantis[..], heart.as_deref(), id_source)
    })
    .await??;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn upload_heart_rate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    let mut form = UploadForm::read(multipart, &[HEART_RATE_FIELD]).await?;
    let file = form.require_file(HEART_RATE_FIELD)?;
    let target = LinkTarget::from(form.session_id()?);

    let pipeline = Arc::clone(&state.pipeline);
    let report =
        tokio::task::spawn_blocking(move || pipeline.ingest_heart_rate(&file[..], target))
            .await??;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserRecord>>> {
    let pipeline = Arc::clone(&state.pipeline);
    let users = tokio::task::spawn_blocking(move || pipeline.store().list_users()).await??;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    let Json(user) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if user.username.trim().is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }

    let pipeline = Arc::clone(&state.pipeline);
    let created = tokio::task::spawn_blocking(move || pipeline.store().create_user(&user)).await??;
    Ok((StatusCode::CREATED, Json(created)))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use mantis_data::aggregator::SessionAggregator;
    use mantis_data::cleaner::CsvCleaner;
    use mantis_store::SessionStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "mantis-test-boundary";
    const MANTIS_EXPORT: &str = "MANTIS X3\nFirmware 2.4.1\nSerial 0042\nExported 03/01/2024\n\n\
                                 ID,Score,Shot Count,Date\n\
                                 1042,8.0,1,03/01/2024 10:00:00\n\
                                 1042,9.5,2,03/01/2024 10:01:00\n\
                                 1042,7.0,3,03/01/2024 10:02:00\n";
    const SAMPLES: &str = "rate,timestamp\n\
                           100,2024-03-01T10:00:00Z\n\
                           140,2024-03-01T10:00:30Z\n\
                           120,2024-03-01T10:01:00Z\n";

    fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let pipeline = IngestionPipeline::new(
            Arc::new(SessionStore::open_in_memory().unwrap()),
            CsvCleaner::new(dir.path()),
            SessionAggregator::default(),
        );
        (dir, router(Arc::new(pipeline)))
    }

    fn multipart_request(uri: &str, parts: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, content) in parts {
            if *name == SESSION_ID_FIELD {
                body.push_str(&format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n\
                     {content}\r\n"
                ));
            } else {
                body.push_str(&format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                     filename=\"{name}.csv\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
                ));
            }
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (_dir, app) = app();
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_creates_session() {
        let (dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request("/api/upload", &[(MANTIS_FIELD, MANTIS_EXPORT)]),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "MANTIS data uploaded successfully");
        assert_eq!(body["totalShots"], 3);
        assert!(body["sessionId"].is_i64());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn device_upload_with_heart_rate() {
        let (_dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/upload/device",
                &[(MANTIS_FIELD, MANTIS_EXPORT), (HEART_FIELD, SAMPLES)],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sessionId"], 1042);
        assert_eq!(body["heartRateRows"], 1);
    }

    #[tokio::test]
    async fn missing_mantis_file_is_bad_request() {
        let (_dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request("/api/upload", &[(HEART_FIELD, SAMPLES)]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains(MANTIS_FIELD));
    }

    #[tokio::test]
    async fn repeated_file_field_is_bad_request() {
        let (_dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/upload",
                &[(MANTIS_FIELD, MANTIS_EXPORT), (MANTIS_FIELD, MANTIS_EXPORT)],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("more than once"));
    }

    #[tokio::test]
    async fn unexpected_file_field_is_bad_request() {
        let (dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/upload",
                &[(MANTIS_FIELD, MANTIS_EXPORT), (HEART_RATE_FIELD, SAMPLES)],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains(HEART_RATE_FIELD));
        assert!(message.contains(HEART_FIELD));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn non_multipart_upload_is_bad_request() {
        let (_dir, app) = app();
        let req = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn banner_only_upload_is_validation_error() {
        let (_dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request("/api/upload", &[(MANTIS_FIELD, "a\nb\nc\nd\ne\n")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("No valid rows"));
    }

    #[tokio::test]
    async fn heart_rate_before_any_session_is_link_failure() {
        let (_dir, app) = app();

        let (status, body) = send(
            &app,
            multipart_request("/api/heart-rate", &[(HEART_RATE_FIELD, SAMPLES)]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("No session available"));
    }

    #[tokio::test]
    async fn heart_rate_links_to_latest_session() {
        let (_dir, app) = app();
        let (_, uploaded) = send(
            &app,
            multipart_request("/api/upload", &[(MANTIS_FIELD, MANTIS_EXPORT)]),
        )
        .await;

        let (status, body) = send(
            &app,
            multipart_request("/api/heart-rate", &[(HEART_RATE_FIELD, SAMPLES)]),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sessionId"], uploaded["sessionId"]);
        assert_eq!(body["message"], "Heart rate data uploaded successfully");
    }

    #[tokio::test]
    async fn heart_rate_with_unknown_session_id() {
        let (_dir, app) = app();
        send(
            &app,
            multipart_request("/api/upload", &[(MANTIS_FIELD, MANTIS_EXPORT)]),
        )
        .await;

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/heart-rate",
                &[(HEART_RATE_FIELD, SAMPLES), (SESSION_ID_FIELD, "999")],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("999"));
    }

    #[tokio::test]
    async fn users_list_and_create() {
        let (_dir, app) = app();

        let req = Request::builder()
            .method("POST")
            .uri("/api/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username":"coach","email":"c@example.com"}"#))
            .unwrap();
        let (status, created) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["username"], "coach");

        let req = Request::builder()
            .uri("/api/users")
            .body(Body::empty())
            .unwrap();
        let (status, users) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_user_rejects_bad_json() {
        let (_dir, app) = app();
        let req = Request::builder()
            .method("POST")
            .uri("/api/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
