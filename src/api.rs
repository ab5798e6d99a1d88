//! Internal HTTP façade: session admission, SDP answer, deletion, health,
//! and the optional URL-ingest routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::Error;
use crate::gateway::Gateway;
use crate::ingest::{self, FfmpegUrlSource, IngestSource};
use crate::metrics;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    #[serde(default)]
    session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    sdp_offer: String,
    ice_servers: Vec<IceServer>,
}

#[derive(Debug, Serialize)]
struct IceServer {
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest {
    #[serde(default)]
    sdp_answer: String,
}

#[derive(Debug, Deserialize)]
struct IngestStartRequest {
    #[serde(default)]
    url: String,
}

/// Builds the internal API router.
pub fn internal_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/internal/sessions", post(create_session))
        .route("/internal/sessions/:id", delete(delete_session))
        .route("/internal/sessions/:id/webrtc/answer", post(set_answer))
        .route("/internal/sessions/:id/ingest/start", post(ingest_start))
        .route("/internal/sessions/:id/ingest/stop", post(ingest_stop))
        .route("/internal/sessions/:id/ingest/status", get(ingest_status))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn healthz() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

async fn create_session(
    State(gw): State<Arc<Gateway>>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    if req.session_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "sessionId required"})),
        )
            .into_response();
    }

    // Fast-fail before any WebRTC wiring; adopt re-checks under the lock.
    let count = gw.session_count().await;
    if count >= gw.config().max_sessions {
        warn!(current = count, max = gw.config().max_sessions, "session cap reached");
        metrics::SESSIONS_REJECTED_TOTAL.inc();
        return capacity_response();
    }

    match gw.create_session(&req.session_id).await {
        Ok(sdp_offer) => {
            let ice_servers = vec![IceServer {
                urls: gw.config().stun_servers.clone(),
            }];
            (
                StatusCode::CREATED,
                Json(CreateSessionResponse {
                    sdp_offer,
                    ice_servers,
                }),
            )
                .into_response()
        }
        Err(Error::CapacityReached) => capacity_response(),
        Err(e) => {
            error!(error = %e, "create session failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "create session failed"})),
            )
                .into_response()
        }
    }
}

fn capacity_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "max sessions reached"})),
    )
        .into_response()
}

async fn set_answer(
    State(gw): State<Arc<Gateway>>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Response {
    if req.sdp_answer.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "sdpAnswer required"})),
        )
            .into_response();
    }
    match gw.set_answer(&id, req.sdp_answer).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(Error::SessionNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "session not found"})),
        )
            .into_response(),
        Err(e) => {
            error!(session = %id, error = %e, "set answer failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "set answer failed"})),
            )
                .into_response()
        }
    }
}

async fn delete_session(State(gw): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    gw.delete_session(&id).await;
    StatusCode::NO_CONTENT.into_response()
}

async fn ingest_start(
    State(gw): State<Arc<Gateway>>,
    Path(id): Path<String>,
    Json(req): Json<IngestStartRequest>,
) -> Response {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "url is required"})),
        )
            .into_response();
    }

    if let Err(e) = ingest::validate_url(&url).await {
        warn!(session = %id, url = %url, error = %e, "ingest url rejected");
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response();
    }

    let Some(sess) = gw.get_session(&id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "session not found"})),
        )
            .into_response();
    };

    let source = Arc::new(FfmpegUrlSource::new(
        url.clone(),
        sess.ring_buffer.clone(),
        gw.config().max_ingest_duration_sec,
    ));
    // Replaces (and stops) any previous source and suppresses mic writes.
    sess.set_ingest_source(source.clone() as Arc<dyn IngestSource>);

    gw.send_event(&sess, None, "ingest.started", json!({"url": url}))
        .await;

    metrics::INGESTS_STARTED_TOTAL.inc();
    metrics::ACTIVE_INGESTS.inc();
    let run_gw = gw.clone();
    tokio::spawn(async move {
        if let Err(e) = source.run().await {
            warn!(session = %sess.id, error = %e, "ingest ended with error");
            run_gw
                .send_error(&sess, None, "INGEST_FAILED", &e.to_string())
                .await;
            metrics::INGESTS_FAILED_TOTAL.inc();
        }
        run_gw
            .send_event(&sess, None, "ingest.stopped", json!({"reason": "source_ended"}))
            .await;
        metrics::ACTIVE_INGESTS.dec();
    });

    (StatusCode::ACCEPTED, Json(json!({"status": "started"}))).into_response()
}

async fn ingest_stop(State(gw): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    let Some(sess) = gw.get_session(&id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "session not found"})),
        )
            .into_response();
    };
    sess.stop_ingest();
    StatusCode::NO_CONTENT.into_response()
}

async fn ingest_status(State(gw): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    let Some(sess) = gw.get_session(&id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "session not found"})),
        )
            .into_response();
    };
    match sess.ingest_status() {
        Some(status) => Json(status).into_response(),
        None => Json(json!({"state": "none"})).into_response(),
    }
}
