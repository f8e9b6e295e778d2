use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use care_flow::{
    CareError, ChatEvent, DocumentStore, DocumentationPolicy, InMemoryDocumentStore,
    InMemorySessionStore, Orchestrator, OrchestratorConfig, SessionStore, TextGenerator, Turn,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::handlers::{OpenRouterGenerator, build_registry};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub documents: Arc<dyn DocumentStore>,
}

/// Error wrapper giving core errors an HTTP shape:
/// `{error: <kind>, message}` with a status per kind.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] CareError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CareError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CareError::Validation(_) => StatusCode::BAD_REQUEST,
            CareError::Routing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewSessionRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user_id: String,
    pub session_id: String,
    pub response: String,
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    pub user_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

/// Assemble the in-process state behind the API from any generator
/// implementation.
pub fn build_state(generator: Arc<dyn TextGenerator>, config: &ServiceConfig) -> AppState {
    let store: Arc<InMemorySessionStore> = Arc::new(InMemorySessionStore::new());
    let documents: Arc<InMemoryDocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let registry = build_registry(
        generator,
        documents.clone(),
        DocumentationPolicy::new(config.doc_trigger_command.clone()),
    );
    let orchestrator = Orchestrator::with_config(
        Arc::new(registry),
        store.clone(),
        OrchestratorConfig {
            max_chain_depth: config.max_chain_depth,
            handler_timeout: config.handler_timeout,
        },
    );
    AppState {
        store,
        orchestrator: Arc::new(orchestrator),
        documents,
    }
}

/// Default application wired to the OpenRouter backend.
pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let generator = Arc::new(OpenRouterGenerator::from_env(&config.generation_model)?);
    Ok(create_router(build_state(generator, config)))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/api/v1/session/new", post(create_session))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/stream", post(chat_stream))
        .route("/api/v1/session/state", get(session_state))
        .route("/api/v1/session", delete(delete_session))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Tag every request with a correlation id and a tracing span.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }
    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "care-service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Conversational health-query orchestration service",
        "endpoints": {
            "POST /api/v1/session/new": "Create a conversation session",
            "POST /api/v1/chat": "Send a message, get the full reply",
            "POST /api/v1/chat/stream": "Send a message, stream progress events",
            "GET /api/v1/session/state": "Session history snapshot",
            "DELETE /api/v1/session": "Delete a session",
            "GET /health": "Health check"
        }
    }))
}

/// The store and registry are built before the router exists, so reaching
/// this handler implies readiness.
async fn health_check(State(_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "care-service",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let (user_id, session_id) = state
        .store
        .create_session(request.user_id, request.session_id)
        .await?;
    info!(%user_id, %session_id, "session created");
    Ok(Json(NewSessionResponse {
        user_id,
        session_id,
        message: "Session created successfully".to_string(),
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .chat(&request.user_id, &request.session_id, &request.message)
        .await?;
    Ok(Json(ChatResponse {
        user_id: request.user_id,
        session_id: request.session_id,
        response: outcome.response_text,
        metadata: outcome.metadata,
    }))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<ChatEvent>(16);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator
            .chat_streaming(&request.user_id, &request.session_id, &request.message, tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, Infallible>(Event::default().data(data))
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn session_state(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    let session = state
        .store
        .get_session(&query.user_id, &query.session_id)
        .await?
        .ok_or_else(|| {
            CareError::SessionNotFound(format!("{}/{}", query.user_id, query.session_id))
        })?;
    Ok(Json(SessionStateResponse {
        user_id: session.user_id,
        session_id: session.session_id,
        created_at: session.created_at,
        last_active: session.last_active,
        turns: session.turns,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .store
        .delete_session(&query.user_id, &query.session_id, false)
        .await?;
    Ok(Json(json!({
        "message": "Session deleted successfully",
        "user_id": query.user_id,
        "session_id": query.session_id,
    })))
}
