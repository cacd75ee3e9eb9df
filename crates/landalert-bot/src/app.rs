//! HTTP surface: chat webhooks, the JSON risk API and the health check.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use landalert_core::{QueryPoint, RiskModel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::conversation::Conversation;
use crate::error::ServiceError;
use crate::store::RecordStore;
use crate::transport::telegram::{self, TelegramClient};
use crate::transport::whatsapp::{self, WhatsAppClient};

/// What the health endpoint reports about the loaded model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub flood_breakpoints: [f32; 4],
}

impl ModelInfo {
    pub fn of(model: &RiskModel) -> Self {
        Self {
            region: model.region.name.clone(),
            created_at: model.provenance.created_at,
            flood_breakpoints: model.flood_breakpoints().values(),
        }
    }
}

#[derive(Clone)]
pub struct TelegramHook {
    pub client: TelegramClient,
    pub secret: Option<String>,
}

#[derive(Clone)]
pub struct WhatsAppHook {
    pub client: WhatsAppClient,
    pub verify_token: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<Conversation>,
    pub store: Arc<dyn RecordStore>,
    pub model: ModelInfo,
    pub telegram: Option<TelegramHook>,
    pub whatsapp: Option<WhatsAppHook>,
}

/// Build the router. Webhook routes exist only for configured platforms.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/risk", get(risk_handler));
    if state.telegram.is_some() {
        app = app.route("/telegram/webhook", post(telegram_webhook));
    }
    if state.whatsapp.is_some() {
        app = app.route(
            "/whatsapp/webhook",
            get(whatsapp_verify).post(whatsapp_webhook),
        );
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

fn ack() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Telegram ──

async fn telegram_webhook(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let Some(hook) = state.telegram.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(expected) = &hook.secret {
        let given = headers
            .get(telegram::SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!("telegram webhook with a bad secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match serde_json::from_value::<telegram::Update>(body) {
        Ok(update) => {
            if let Some(inbound) = telegram::parse_update(update) {
                let conversation = Arc::clone(&state.conversation);
                tokio::spawn(async move {
                    let sink = hook.client.sink(inbound.chat_id);
                    conversation.handle(&inbound.user, inbound.incoming, &sink).await;
                });
            }
        }
        // Acknowledge anyway so Telegram does not redeliver it.
        Err(e) => warn!(error = %e, "unparseable telegram update"),
    }
    ack().into_response()
}

// ── WhatsApp ──

async fn whatsapp_verify(State(state): State<AppState>, Query(query): Query<whatsapp::VerifyQuery>) -> Response {
    let Some(hook) = &state.whatsapp else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match whatsapp::verify_subscription(&query, &hook.verify_token) {
        Some(challenge) => {
            debug!("whatsapp webhook verified");
            challenge.into_response()
        }
        None => {
            warn!("whatsapp webhook verification refused");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

async fn whatsapp_webhook(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(hook) = state.whatsapp.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match serde_json::from_value::<whatsapp::WebhookPayload>(body) {
        Ok(payload) => {
            let messages = whatsapp::parse_webhook(payload);
            if !messages.is_empty() {
                let conversation = Arc::clone(&state.conversation);
                tokio::spawn(async move {
                    for inbound in messages {
                        let sink = hook.client.sink(inbound.user.user_id.clone());
                        conversation.handle(&inbound.user, inbound.incoming, &sink).await;
                    }
                });
            }
        }
        Err(e) => warn!(error = %e, "unparseable whatsapp payload"),
    }
    ack().into_response()
}

// ── JSON API ──

#[derive(Debug, Deserialize)]
pub struct RiskQuery {
    pub lat: f64,
    pub lon: f64,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn risk_handler(State(state): State<AppState>, Query(q): Query<RiskQuery>) -> Response {
    let point = match QueryPoint::new(q.lat, q.lon) {
        Ok(p) => p,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.conversation.analyzer().analyze(point).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e @ ServiceError::Timeout { .. }) => {
            warn!(error = %e, "risk query timed out");
            error_body(StatusCode::GATEWAY_TIMEOUT, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "risk query failed");
            error_body(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

// ── Health ──

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    model: ModelInfo,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Returns 200 OK if the record store answers within 5 s, 503 otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(Duration::from_secs(5), state.store.ping()).await {
        Ok(Ok(())) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    };

    let healthy = database.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        database,
        model: state.model.clone(),
    };
    (status_code, Json(body))
}
