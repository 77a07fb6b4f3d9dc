use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use code_exec::{
    CodeExecutionService, EngineState, ExecuteRequest, ExecutionResult, Language, RuntimeConfig,
    SecurityPosture,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast::error::RecvError, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Rejected(#[from] code_exec::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::Rejected(_) | ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::ServerError(ref e) => {
                error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Lifecycle state of one engine as reported by `GET /engines`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineStatus {
    pub language: Language,
    pub state: EngineState,
}

impl EngineStatus {
    fn new(language: Language, state: &EngineState) -> Self {
        Self {
            language,
            state: state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<CodeExecutionService>,
}

/// Build the execution service the server fronts.
pub async fn create_service(config: RuntimeConfig) -> Result<Arc<CodeExecutionService>, ServerError> {
    let service = CodeExecutionService::new(config)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;
    Ok(Arc::new(service))
}

pub fn create_app(service: Arc<CodeExecutionService>) -> Router {
    let state = AppState { service };
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute))
        .route("/engines", get(engines))
        .route("/engines/:language/reset", post(reset_engine))
        .route("/security", get(security))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Log every engine readiness notification until the service goes away.
pub fn spawn_readiness_logger(service: &CodeExecutionService) -> JoinHandle<()> {
    let mut events = service.subscribe_readiness();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.ready => info!(language = %event.language, "Engine is ready"),
                Ok(event) => warn!(language = %event.language, "Engine has failed"),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} readiness events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting code execution server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;
    serve(listener, app).await
}

/// Serve `app` on an already bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), ServerError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ServerError> {
    let Json(payload) = payload.map_err(|rejection| ServerError::BadRequest(rejection.body_text()))?;
    let result = state.service.submit(payload).await?;
    Ok(Json(result))
}

async fn engines(State(state): State<AppState>) -> Json<Vec<EngineStatus>> {
    Json(
        state
            .service
            .engine_states()
            .iter()
            .map(|(language, engine_state)| EngineStatus::new(*language, engine_state))
            .collect(),
    )
}

async fn reset_engine(
    State(state): State<AppState>,
    Path(language): Path<String>,
) -> Result<Json<EngineStatus>, ServerError> {
    let language: Language = language.parse()?;
    state
        .service
        .reset_engine(language)
        .await
        .map_err(|e| ServerError::Conflict(e.to_string()))?;

    let states = state.service.engine_states();
    let current = states
        .iter()
        .find(|(l, _)| *l == language)
        .map(|(_, s)| s.clone())
        .unwrap_or(EngineState::Uninitialized);
    Ok(Json(EngineStatus::new(language, &current)))
}

async fn security(State(state): State<AppState>) -> Json<SecurityPosture> {
    Json(state.service.security_posture())
}
