//! HTTP API for the ShadowAuth checkpoint gateway.
//!
//! The whole wire contract is one JSON endpoint discriminated by an
//! `action` parameter: POST bodies carry a tagged enum, and the polling
//! form (`get_status`) is additionally reachable over GET so clients can
//! poll without a body.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shadowauth_session::{GateError, SessionManager};
use shadowauth_types::{ScriptId, SessionToken};
use std::sync::Arc;

/// Shared state of the gateway.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

/// The action-discriminated request body of `POST /api/v1/gateway`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GatewayRequest {
    Start {
        script_id: ScriptId,
    },
    GetCheckpointUrl {
        session_token: SessionToken,
        step: u32,
    },
    CompleteStep {
        session_token: SessionToken,
        step: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anti_bypass_token: Option<String>,
    },
    GetStatus {
        session_token: SessionToken,
    },
    ResetSession {
        session_token: SessionToken,
    },
}

/// Query form of the polling action: `GET /api/v1/gateway?action=get_status`.
#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub action: String,
    pub session_token: Option<SessionToken>,
}

/// Success body of `get_checkpoint_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectResponse {
    pub redirect_url: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub scripts: usize,
}

/// Wire-side error wrapper mapping the gate taxonomy onto HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    Gate(GateError),
    BadRequest(String),
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self::Gate(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            Self::Gate(e) => {
                let status = match &e {
                    GateError::NotFound => StatusCode::NOT_FOUND,
                    GateError::InvalidStep { .. } | GateError::OutOfOrder { .. } => {
                        StatusCode::CONFLICT
                    }
                    GateError::VerificationFailed(_) => StatusCode::UNAUTHORIZED,
                    GateError::SessionExpired => StatusCode::GONE,
                    GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let mut body = json!({ "error": e.to_string() });
                // Tells the client to re-request the checkpoint URL.
                if matches!(e, GateError::VerificationFailed(_)) {
                    body["requires_redirect"] = json!(true);
                }
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

async fn gateway_handler(
    State(state): State<AppState>,
    Json(request): Json<GatewayRequest>,
) -> Result<Response, ApiError> {
    let manager = &state.manager;
    let response = match request {
        GatewayRequest::Start { script_id } => {
            Json(manager.start(&script_id)?).into_response()
        }
        GatewayRequest::GetCheckpointUrl {
            session_token,
            step,
        } => {
            let redirect_url = manager.checkpoint_url(&session_token, step)?;
            Json(RedirectResponse { redirect_url }).into_response()
        }
        GatewayRequest::CompleteStep {
            session_token,
            step,
            anti_bypass_token,
        } => {
            let snapshot =
                manager.complete_step(&session_token, step, anti_bypass_token.as_deref())?;
            Json(snapshot).into_response()
        }
        GatewayRequest::GetStatus { session_token } => {
            Json(manager.status(&session_token)?).into_response()
        }
        GatewayRequest::ResetSession { session_token } => {
            manager.reset(&session_token)?;
            Json(json!({})).into_response()
        }
    };
    Ok(response)
}

async fn gateway_query_handler(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
) -> Result<Response, ApiError> {
    if query.action != "get_status" {
        return Err(ApiError::BadRequest(format!(
            "action '{}' is not available over GET",
            query.action
        )));
    }
    let session_token = query
        .session_token
        .ok_or_else(|| ApiError::BadRequest("session_token is required".to_string()))?;
    let snapshot = state.manager.status(&session_token)?;
    Ok(Json(snapshot).into_response())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        scripts: state.manager.registry().len(),
    })
}

/// Build the HTTP API router with the given gateway state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/gateway",
            post(gateway_handler).get(gateway_query_handler),
        )
        .route("/health", get(health_handler))
        .with_state(state)
}
