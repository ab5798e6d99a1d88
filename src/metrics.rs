//! Prometheus series for the gateway. Registered once in the default
//! registry; the server binary exposes them on the metrics address.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "voice_gateway_active_sessions",
        "Number of active WebRTC sessions"
    )
    .expect("register metric")
});

pub static ACTIVE_ACTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "voice_gateway_active_actions",
        "Number of in-flight enunciate actions"
    )
    .expect("register metric")
});

pub static INFERENCE_SEM_USED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "voice_gateway_inference_sem_used",
        "Inference semaphore slots currently in use"
    )
    .expect("register metric")
});

pub static ACTIVE_INGESTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "voice_gateway_active_ingests",
        "URL ingest sources currently running"
    )
    .expect("register metric")
});

pub static SESSIONS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("voice_gateway_sessions_created_total", "Sessions created")
        .expect("register metric")
});

pub static SESSIONS_REJECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_sessions_rejected_total",
        "Sessions rejected due to the admission cap"
    )
    .expect("register metric")
});

pub static SESSIONS_EXPIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_sessions_expired_total",
        "Sessions deleted for never receiving an SDP answer"
    )
    .expect("register metric")
});

/// Enunciate outcomes by label: success, rate_limited, timeout, cancelled,
/// asr_error, tts_error.
pub static ACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "voice_gateway_actions_total",
        "Enunciate actions by outcome",
        &["outcome"]
    )
    .expect("register metric")
});

pub static OPUS_DECODE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_opus_decode_errors_total",
        "Opus decode failures"
    )
    .expect("register metric")
});

pub static OPUS_ENCODE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_opus_encode_errors_total",
        "Opus encode failures"
    )
    .expect("register metric")
});

pub static INFERENCE_TIMEOUTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_inference_timeouts_total",
        "Inference calls cut off by the action deadline"
    )
    .expect("register metric")
});

pub static RTP_PACKETS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_rtp_packets_total",
        "RTP packets received across all sessions"
    )
    .expect("register metric")
});

pub static RTP_GAPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voice_gateway_rtp_gaps_total",
        "RTP sequence gaps concealed with PLC"
    )
    .expect("register metric")
});

pub static INGESTS_STARTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("voice_gateway_ingests_started_total", "Ingests started")
        .expect("register metric")
});

pub static INGESTS_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("voice_gateway_ingests_failed_total", "Ingests failed")
        .expect("register metric")
});

/// Per-stage action latency. Stages: total, snapshot, asr, translate,
/// tts_first_chunk.
pub static ACTION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "voice_gateway_action_duration_ms",
        "Enunciate action duration in milliseconds by stage",
        &["stage"],
        vec![100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0]
    )
    .expect("register metric")
});
