use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use report_flow::{
    Collaborators, FlowConfig, InMemorySessionStorage, InputDocument, Language, Session,
    SessionStorage, WorkflowController,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    collaborators::GeminiClient,
    config::AppConfig,
    export::{DEFAULT_FILE_NAME, ExportOptions, render_report_pdf},
    models::{AcceptedResponse, LanguageRequest, SessionResponse},
};

type ApiResult<T> = Result<T, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn conflict_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub collaborators: Collaborators,
    pub flow_config: FlowConfig,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        Self {
            session_storage: Arc::new(InMemorySessionStorage::new()),
            collaborators,
            flow_config: config.flow_config(),
            config: Arc::new(config),
        }
    }
}

/// Build the HTTP application backed by Gemini.
pub fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let app_state = AppState::new(config, Collaborators::from_shared(gemini));
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    // Leave room for the multipart framing around the file itself.
    let body_limit = app_state.config.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/reports", post(create_report))
        .route(
            "/reports/{session_id}",
            get(get_report).delete(delete_report),
        )
        .route("/reports/{session_id}/file", post(replace_file))
        .route("/reports/{session_id}/language", post(change_language))
        .route("/reports/{session_id}/reset", post(reset_report))
        .route("/reports/{session_id}/export", get(export_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tag every request with a correlation ID and run it inside a matching span.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MediAssist Medical Report Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Upload a medical report and get a plain-language AI analysis, with translation and PDF export",
        "accepted_types": ["application/pdf", "image/png", "image/jpeg", "text/plain"],
        "languages": Language::ALL,
        "endpoints": {
            "POST /reports": "Upload a report (multipart field `file`) and start analysis",
            "GET /reports/{session_id}": "Get session status and the displayed report",
            "POST /reports/{session_id}/file": "Analyze another file in the same session",
            "POST /reports/{session_id}/language": "Switch the report language",
            "POST /reports/{session_id}/reset": "Clear the session",
            "GET /reports/{session_id}/export": "Download the displayed report as PDF",
            "DELETE /reports/{session_id}": "Close the session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let document = read_upload(multipart, state.config.max_upload_bytes).await?;

    let evicted = state
        .session_storage
        .evict_expired(state.config.session_ttl)
        .await;
    if !evicted.is_empty() {
        info!(count = evicted.len(), "Dropped expired sessions");
    }

    let session = Session::new(state.flow_config.clone(), state.collaborators.clone());
    let session_id = session.id.clone();
    info!(session_id = %session_id, file = %document.name, "Creating report session");

    state.session_storage.save(session.clone()).await;
    start_analysis(&session, document);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            session_id,
            status: "accepted".to_string(),
            message: "Report analysis started".to_string(),
        }),
    ))
}

async fn replace_file(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let session = load_session(&state, &session_id).await?;
    ensure_idle(&session)?;

    let document = read_upload(multipart, state.config.max_upload_bytes).await?;
    // Another request may have started work while the body was read.
    ensure_idle(&session)?;
    start_analysis(&session, document);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            session_id,
            status: "accepted".to_string(),
            message: "Report analysis restarted".to_string(),
        }),
    ))
}

async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let session = load_session(&state, &session_id).await?;
    let snapshot = session.controller.state();
    Ok(Json(SessionResponse::new(&session, &snapshot)))
}

async fn change_language(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<LanguageRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let language: Language = request
        .language
        .parse()
        .map_err(|e: report_flow::UnknownLanguage| bad_request_error(&e.to_string()))?;

    let session = load_session(&state, &session_id).await?;
    ensure_idle(&session)?;
    if session.controller.state().original_analysis.is_none() {
        return Err(conflict_error("No analysis available to translate", &session_id));
    }

    // English and cached languages are applied here and leave no job.
    if let Some(job) = WorkflowController::begin_translation(session.controller.clone(), language)
    {
        let span = info_span!("report_session", session_id = %session_id);
        tokio::spawn(job.run().instrument(span));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            session_id,
            status: "accepted".to_string(),
            message: format!("Switching report language to {}", language),
        }),
    ))
}

async fn reset_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let session = load_session(&state, &session_id).await?;
    session.controller.reset();
    let snapshot = session.controller.state();
    Ok(Json(SessionResponse::new(&session, &snapshot)))
}

async fn export_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let session = load_session(&state, &session_id).await?;
    let snapshot = session.controller.state();
    let Some(report) = snapshot.displayed_report().cloned() else {
        return Err(conflict_error("No analysis available to export", &session_id));
    };

    let language = snapshot.current_language;
    let options = ExportOptions {
        font_path: state.config.pdf_font.clone(),
    };
    let rendered = tokio::task::spawn_blocking(move || render_report_pdf(&report, language, &options))
        .await
        .map_err(|e| internal_error("PDF export task failed", &e.to_string()))?
        .map_err(|e| {
            error!(session_id = %session_id, "Failed to render PDF: {}", e);
            internal_error("Failed to render PDF", &e.to_string())
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DEFAULT_FILE_NAME),
            ),
        ],
        rendered.bytes,
    )
        .into_response())
}

async fn delete_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    match state.session_storage.delete(&session_id).await {
        Some(session) => {
            session.controller.reset();
            info!(session_id = %session_id, "Session closed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found_error("Session not found", &session_id)),
    }
}

async fn load_session(state: &AppState, session_id: &str) -> ApiResult<Session> {
    state
        .session_storage
        .get(session_id)
        .await
        .ok_or_else(|| not_found_error("Session not found", session_id))
}

/// Mirror the UI disabling its controls while a step is running.
fn ensure_idle(session: &Session) -> ApiResult<()> {
    if session.controller.is_busy() {
        return Err(conflict_error(
            "The report is still being processed",
            &session.id,
        ));
    }
    Ok(())
}

/// Apply the file selection before responding, so the session already reads
/// as busy, then run extraction and analysis in the background.
fn start_analysis(session: &Session, document: InputDocument) {
    if let Some(job) = WorkflowController::begin_analysis(session.controller.clone(), document) {
        let span = info_span!("report_session", session_id = %session.id);
        tokio::spawn(job.run().instrument(span));
    }
}

/// Read the `file` field of a multipart upload.
async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> ApiResult<InputDocument> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), Json(json!({ "error": e.body_text() }))))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (e.status(), Json(json!({ "error": e.body_text() }))))?;

        if bytes.len() > max_bytes {
            warn!(file = %file_name, size = bytes.len(), "Upload exceeds size limit");
            return Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": "File is too large",
                    "max_bytes": max_bytes
                })),
            ));
        }

        let document = InputDocument::new(file_name, bytes.to_vec(), content_type.as_deref());
        if !document.media_type.is_supported() {
            warn!(
                file = %document.name,
                media_type = %document.media_type,
                "Unsupported upload, extraction will reject it"
            );
        }
        return Ok(document);
    }

    Err(bad_request_error("A multipart field named `file` is required"))
}
