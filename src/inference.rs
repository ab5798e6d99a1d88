//! Typed contract to the external recognition and synthesis services, plus
//! the mock used by tests.
//!
//! Recognition is a one-shot unary call; synthesis is an ordered stream of
//! raw PCM s16le 16 kHz mono chunks with a separate terminal error channel.
//! Both respect the caller's action scope.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::ActionScope;

/// Result of one recognition call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub target_language: String,
    #[serde(default)]
    pub segments: Vec<TranscribedSegment>,
    #[serde(default)]
    pub inference_ms: u64,
    #[serde(default)]
    pub translate_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribedSegment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Ordered synthesis output: PCM chunks and a terminal error channel. The
/// chunk channel closing marks the end of the stream.
pub struct SynthesisStream {
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub errors: mpsc::Receiver<Error>,
}

/// Client for the recognition and streaming-synthesis services.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// One-shot recognition of a PCM s16le 16 kHz mono snapshot. Returns
    /// [`Error::ActionCancelled`] when the scope ends first.
    #[allow(clippy::too_many_arguments)]
    async fn transcribe(
        &self,
        scope: &ActionScope,
        audio: &[u8],
        session_id: &str,
        action_id: &str,
        language_hint: &str,
        task: &str,
        target_language: &str,
    ) -> Result<TranscribeResult>;

    /// Starts a synthesis stream for `text`. The producer stops at its next
    /// yield once the scope is cancelled.
    #[allow(clippy::too_many_arguments)]
    async fn synthesize_stream(
        &self,
        scope: &ActionScope,
        text: &str,
        session_id: &str,
        action_id: &str,
        voice: &str,
        language: &str,
        speed: f32,
    ) -> Result<SynthesisStream>;

    /// Releases connections. Idempotent.
    async fn close(&self) {}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    text: &'a str,
    session_id: &'a str,
    action_id: &'a str,
    voice: &'a str,
    language: &'a str,
    speed: f32,
}

/// HTTP client against the recognition and synthesis services.
pub struct RemoteInferenceClient {
    http: reqwest::Client,
    asr_base: String,
    tts_base: String,
}

impl RemoteInferenceClient {
    /// Builds a client for the given `host:port` addresses.
    pub fn new(asr_addr: &str, tts_addr: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            asr_base: format!("http://{asr_addr}"),
            tts_base: format!("http://{tts_addr}"),
        }
    }
}

#[async_trait]
impl InferenceClient for RemoteInferenceClient {
    async fn transcribe(
        &self,
        scope: &ActionScope,
        audio: &[u8],
        session_id: &str,
        action_id: &str,
        language_hint: &str,
        task: &str,
        target_language: &str,
    ) -> Result<TranscribeResult> {
        let request = self
            .http
            .post(format!("{}/v1/transcribe", self.asr_base))
            .query(&[
                ("sessionId", session_id),
                ("actionId", action_id),
                ("languageHint", language_hint),
                ("task", task),
                ("targetLanguage", target_language),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send();

        tokio::select! {
            _ = scope.cancelled() => Err(Error::ActionCancelled),
            response = request => {
                let response = response?.error_for_status()?;
                Ok(response.json::<TranscribeResult>().await?)
            }
        }
    }

    async fn synthesize_stream(
        &self,
        scope: &ActionScope,
        text: &str,
        session_id: &str,
        action_id: &str,
        voice: &str,
        language: &str,
        speed: f32,
    ) -> Result<SynthesisStream> {
        let request = self
            .http
            .post(format!("{}/v1/synthesize", self.tts_base))
            .json(&SynthesizeRequest {
                text,
                session_id,
                action_id,
                voice,
                language,
                speed,
            })
            .send();

        let response = tokio::select! {
            _ = scope.cancelled() => return Err(Error::ActionCancelled),
            response = request => response?.error_for_status()?,
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(1);
        let scope = scope.clone();
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            loop {
                let item = tokio::select! {
                    _ = scope.cancelled() => break,
                    item = body.next() => item,
                };
                match item {
                    Some(Ok(bytes)) => {
                        if chunk_tx.send(bytes.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = err_tx.send(Error::Http(e)).await;
                        break;
                    }
                    None => break,
                }
            }
            debug!("synthesis stream ended");
        });

        Ok(SynthesisStream {
            chunks: chunk_rx,
            errors: err_rx,
        })
    }
}

/// Canned-response client for tests: configurable delays, text, and chunking.
pub struct MockInferenceClient {
    pub transcribe_delay: Duration,
    pub transcribe_text: String,
    pub transcribe_language: String,
    pub translated_text: String,
    pub target_language: String,
    /// When set, transcribe fails with this message instead of answering.
    pub transcribe_error: Option<String>,
    pub tts_chunk_delay: Duration,
    pub tts_chunk_count: usize,
    /// Bytes per chunk; 3200 is 100 ms of 16 kHz s16le audio.
    pub tts_chunk_size: usize,
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self {
            transcribe_delay: Duration::from_millis(50),
            transcribe_text: "hello world".into(),
            transcribe_language: "en".into(),
            translated_text: String::new(),
            target_language: String::new(),
            transcribe_error: None,
            tts_chunk_delay: Duration::from_millis(10),
            tts_chunk_count: 10,
            tts_chunk_size: 3200,
        }
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn transcribe(
        &self,
        scope: &ActionScope,
        _audio: &[u8],
        _session_id: &str,
        _action_id: &str,
        _language_hint: &str,
        _task: &str,
        _target_language: &str,
    ) -> Result<TranscribeResult> {
        tokio::select! {
            _ = scope.cancelled() => return Err(Error::ActionCancelled),
            _ = tokio::time::sleep(self.transcribe_delay) => {}
        }
        if let Some(msg) = &self.transcribe_error {
            return Err(Error::Inference(msg.clone()));
        }
        Ok(TranscribeResult {
            text: self.transcribe_text.clone(),
            language: self.transcribe_language.clone(),
            translated_text: self.translated_text.clone(),
            target_language: self.target_language.clone(),
            inference_ms: self.transcribe_delay.as_millis() as u64,
            ..Default::default()
        })
    }

    async fn synthesize_stream(
        &self,
        scope: &ActionScope,
        _text: &str,
        _session_id: &str,
        _action_id: &str,
        _voice: &str,
        _language: &str,
        _speed: f32,
    ) -> Result<SynthesisStream> {
        let (chunk_tx, chunk_rx) = mpsc::channel(self.tts_chunk_count.max(1));
        let (_err_tx, err_rx) = mpsc::channel(1);

        let scope = scope.clone();
        let count = self.tts_chunk_count;
        let size = self.tts_chunk_size;
        let delay = self.tts_chunk_delay;
        tokio::spawn(async move {
            for _ in 0..count {
                tokio::select! {
                    _ = scope.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if chunk_tx.send(vec![0u8; size]).await.is_err() {
                    return;
                }
            }
        });

        Ok(SynthesisStream {
            chunks: chunk_rx,
            errors: err_rx,
        })
    }
}
