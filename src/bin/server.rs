//! Voice gateway server: internal session API plus a Prometheus endpoint.
//!
//! All flags can also be set through the environment, e.g.
//! `INTERNAL_API_ADDR=0.0.0.0:9091 ASR_ADDR=asr:50051 server`.

use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_gateway::{Config, Gateway};

#[derive(Parser)]
#[command(name = "voice-gateway")]
#[command(about = "Real-time voice interaction gateway")]
struct Args {
    /// Media listener hint
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    listen_addr: String,

    /// Internal HTTP API bind address
    #[arg(long, env = "INTERNAL_API_ADDR", default_value = "0.0.0.0:9091")]
    internal_api_addr: String,

    /// Prometheus metrics bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9092")]
    metrics_addr: String,

    /// Recognition service address
    #[arg(long, env = "ASR_ADDR", default_value = "localhost:50051")]
    asr_addr: String,

    /// Synthesis service address
    #[arg(long, env = "TTS_ADDR", default_value = "localhost:50052")]
    tts_addr: String,

    /// Per-session ring buffer capacity in seconds
    #[arg(long, env = "RING_BUFFER_SEC", default_value = "60")]
    ring_buffer_sec: usize,

    /// Comma-separated STUN/TURN server URLs
    #[arg(long, env = "STUN_SERVERS", default_value = "stun:stun.l.google.com:19302", value_delimiter = ',')]
    stun_servers: Vec<String>,

    /// Admission cap on concurrent sessions
    #[arg(long, env = "MAX_SESSIONS", default_value = "100")]
    max_sessions: usize,

    /// Upper bound on the enunciate snapshot window in seconds
    #[arg(long, env = "MAX_LOOKBACK_SEC", default_value = "60")]
    max_lookback_sec: usize,

    /// Deadline for one enunciate action in seconds
    #[arg(long, env = "ACTION_TIMEOUT_SEC", default_value = "60")]
    action_timeout_sec: u64,

    /// Bound on concurrent inference calls
    #[arg(long, env = "MAX_INFERENCE_CONCURRENCY", default_value = "4")]
    max_inference_concurrency: usize,

    /// Grace period before expiring sessions that never got an answer
    #[arg(long, env = "SESSION_ANSWER_GRACE_SEC", default_value = "30")]
    session_answer_grace_sec: u64,

    /// Cap on one URL ingest run in seconds (0 disables)
    #[arg(long, env = "MAX_INGEST_DURATION_SEC", default_value = "3600")]
    max_ingest_duration_sec: u64,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            listen_addr: self.listen_addr,
            internal_api_addr: self.internal_api_addr,
            metrics_addr: self.metrics_addr,
            asr_addr: self.asr_addr,
            tts_addr: self.tts_addr,
            ring_buffer_sec: self.ring_buffer_sec,
            stun_servers: self.stun_servers,
            max_sessions: self.max_sessions,
            max_lookback_sec: self.max_lookback_sec,
            action_timeout_sec: self.action_timeout_sec,
            max_inference_concurrency: self.max_inference_concurrency,
            session_answer_grace_sec: self.session_answer_grace_sec,
            max_ingest_duration_sec: self.max_ingest_duration_sec,
        }
    }
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        error!(error = %e, "metrics encoding failed");
        return axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Args::parse().into_config();
    info!(
        listen = %cfg.listen_addr,
        internal_api = %cfg.internal_api_addr,
        metrics = %cfg.metrics_addr,
        asr = %cfg.asr_addr,
        tts = %cfg.tts_addr,
        max_sessions = cfg.max_sessions,
        max_inference_concurrency = cfg.max_inference_concurrency,
        "voice gateway starting"
    );

    let internal_api_addr = cfg.internal_api_addr.clone();
    let metrics_addr = cfg.metrics_addr.clone();
    let gateway = Gateway::new(cfg)?;

    let shutdown = tokio_util::sync::CancellationToken::new();

    let api_listener = tokio::net::TcpListener::bind(&internal_api_addr).await?;
    info!(addr = %internal_api_addr, "internal api listening");
    let api_router = voice_gateway::api::internal_router(gateway.clone());
    let api_shutdown = shutdown.clone();
    let api_server = tokio::spawn(async move {
        let result = axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "internal api server failed");
        }
    });

    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    info!(addr = %metrics_addr, "metrics listening");
    let metrics_router = Router::new().route("/metrics", get(metrics_handler));
    let metrics_shutdown = shutdown.clone();
    let metrics_server = tokio::spawn(async move {
        let result = axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "metrics server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    gateway.shutdown().await;
    shutdown.cancel();
    let _ = api_server.await;
    let _ = metrics_server.await;

    Ok(())
}
