//! Crate-wide error and result types.

use thiserror::Error;

/// Errors produced by the gateway core.
#[derive(Debug, Error)]
pub enum Error {
    /// Opus encode/decode failure.
    #[error("opus codec: {0}")]
    Opus(#[from] audiopus::Error),

    /// Failure inside the WebRTC stack (peer connection, track, channel).
    #[error("webrtc: {0}")]
    Webrtc(#[from] webrtc::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Recognition or synthesis service returned a non-cancellation error.
    #[error("inference: {0}")]
    Inference(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Admission cap reached; the caller should answer 503.
    #[error("max sessions reached")]
    CapacityReached,

    /// The session was stopped; the operation did not run.
    #[error("session stopped")]
    SessionStopped,

    /// The action scope was cancelled (supersede, stop, or deadline).
    #[error("action cancelled")]
    ActionCancelled,

    #[error("ingest: {0}")]
    Ingest(String),

    /// The gateway was built without a WebRTC API (test mode).
    #[error("webrtc api not configured")]
    NoWebrtcApi,

    /// Signaling-level failure outside the WebRTC library's own errors.
    #[error("signaling: {0}")]
    Signaling(String),
}

pub type Result<T> = std::result::Result<T, Error>;
