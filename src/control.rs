//! In-band control protocol: JSON envelopes carried over the reliable
//! ordered "commands" channel, and the router that dispatches inbound
//! messages to typed handlers.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// Top-level wrapper for every control-channel message, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    /// Sender wall clock, unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Builds an outbound envelope stamped with the current time.
    pub fn new(
        kind: impl Into<String>,
        session_id: impl Into<String>,
        action_id: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            session_id: session_id.into(),
            action_id,
            timestamp: now_millis(),
            payload,
        }
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Payload of `command.enunciate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnunciate {
    #[serde(default)]
    pub lookback_seconds: i64,
    #[serde(default)]
    pub target_language: String,
    #[serde(default)]
    pub tts_options: TtsOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsOptions {
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub speed: f64,
}

/// Payload of `asr.final`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAsrFinal {
    pub text: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub inference_ms: u64,
    #[serde(default)]
    pub translate_ms: u64,
}

/// One time-aligned piece of a transcription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Payload of `tts.started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTtsStarted {
    pub voice: String,
}

/// Payload of `tts.done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTtsDone {
    pub duration_ms: u64,
}

/// Payload of `metrics.latency`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetricsLatency {
    pub snapshot_ms: f64,
    pub asr_ms: f64,
    #[serde(default)]
    pub translate_ms: f64,
    pub tts_first_chunk_ms: f64,
    pub total_ms: f64,
}

/// Payload of `error` events. `code` values come from the fixed taxonomy:
/// `INSUFFICIENT_AUDIO_BUFFER`, `RATE_LIMITED`, `ASR_FAILED`, `INGEST_FAILED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

/// Payload of `ingest.started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIngestStarted {
    pub url: String,
}

/// Payload of `ingest.stopped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIngestStopped {
    pub reason: String,
}

type Handler = Box<dyn Fn(&Envelope) -> Result<()> + Send + Sync>;

/// Dispatches inbound control messages to handlers registered by type.
#[derive(Default)]
pub struct Router {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a message type, replacing any previous one.
    pub fn register<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap()
            .insert(kind.into(), Box::new(handler));
    }

    /// Parses a raw frame and routes it. Malformed envelopes are an error for
    /// the caller to log; unknown types are dropped without error.
    pub fn dispatch(&self, raw: &[u8]) -> Result<()> {
        let env: Envelope = serde_json::from_slice(raw)?;
        let handlers = self.handlers.read().unwrap();
        match handlers.get(&env.kind) {
            Some(handler) => handler(&env),
            None => {
                debug!(kind = %env.kind, "unknown control message type");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn envelope_uses_wire_field_names() {
        let env = Envelope::new(
            "asr.final",
            "s1",
            Some("a1".into()),
            serde_json::json!({"text": "hi"}),
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "asr.final");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["actionId"], "a1");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn action_id_is_omitted_when_absent() {
        let env = Envelope::new("error", "s1", None, Value::Null);
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("actionId"));
    }

    #[test]
    fn command_payload_defaults() {
        let cmd: CommandEnunciate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cmd.lookback_seconds, 0);
        assert!(cmd.target_language.is_empty());
        assert_eq!(cmd.tts_options.speed, 0.0);
    }

    #[test]
    fn dispatch_routes_to_handler() {
        let router = Router::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        router.register("command.enunciate", move |env| {
            assert_eq!(env.session_id, "s1");
            hits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let raw = br#"{"type":"command.enunciate","sessionId":"s1","timestamp":1,"payload":{}}"#;
        router.dispatch(raw).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let router = Router::new();
        let raw = br#"{"type":"command.bogus","sessionId":"s1","timestamp":1,"payload":{}}"#;
        assert!(router.dispatch(raw).is_ok());
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        let router = Router::new();
        assert!(router.dispatch(b"not json").is_err());
    }
}
