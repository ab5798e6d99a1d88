//! Gateway supervisor: session registry, admission, WebRTC wiring, and the
//! enunciate orchestrator.
//!
//! The orchestrator runs one bounded pipeline per action: snapshot the ring
//! buffer, recognize, optionally synthesize and play back, then emit staged
//! latency telemetry. External failures map onto a fixed error taxonomy sent
//! in-band; deadline and cancellation end the action silently because the
//! client either replaced it or is going away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::codec::{OpusDecoder, OpusEncoder};
use crate::config::Config;
use crate::control::{
    CommandEnunciate, Envelope, EventAsrFinal, EventError, EventMetricsLatency, EventTtsDone,
    EventTtsStarted, Router, Segment,
};
use crate::error::{Error, Result};
use crate::inference::{InferenceClient, RemoteInferenceClient};
use crate::metrics;
use crate::pool::SnapshotPool;
use crate::session::{ActionScope, DataChannelControl, OpusTrackSink, Session};

/// Cap on waiting for ICE candidate gathering during session creation.
const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Opus payload type offered to the browser.
const OPUS_PAYLOAD_TYPE: u8 = 111;

/// How one enunciate action ended. `NoAudio` happens before an outcome is
/// claimed, so it never reaches the outcome counters.
enum ActionOutcome {
    Success,
    NoAudio,
    RateLimited,
    Timeout,
    Cancelled,
    AsrError,
    TtsError,
}

impl ActionOutcome {
    fn label(&self) -> Option<&'static str> {
        match self {
            ActionOutcome::Success => Some("success"),
            ActionOutcome::NoAudio => None,
            ActionOutcome::RateLimited => Some("rate_limited"),
            ActionOutcome::Timeout => Some("timeout"),
            ActionOutcome::Cancelled => Some("cancelled"),
            ActionOutcome::AsrError => Some("asr_error"),
            ActionOutcome::TtsError => Some("tts_error"),
        }
    }
}

/// Supervisor owning the session registry, the inference concurrency gate,
/// and the snapshot buffer pool.
pub struct Gateway {
    cfg: Config,
    api: Option<API>,
    inference: Arc<dyn InferenceClient>,
    inference_sem: Arc<Semaphore>,
    snapshot_pool: Arc<SnapshotPool>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Gateway {
    /// Builds a gateway with Opus registered in the media engine and a
    /// remote inference client against the configured services.
    pub fn new(cfg: Config) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: OPUS_PAYLOAD_TYPE,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let inference = Arc::new(RemoteInferenceClient::new(&cfg.asr_addr, &cfg.tts_addr));
        Ok(Self::with_parts(cfg, Some(api), inference))
    }

    /// Builds a gateway with an injected inference client and no WebRTC API.
    /// Sessions are adopted pre-wired; `create_session` is unavailable.
    pub fn new_for_test(cfg: Config, inference: Arc<dyn InferenceClient>) -> Arc<Self> {
        Self::with_parts(cfg, None, inference)
    }

    fn with_parts(cfg: Config, api: Option<API>, inference: Arc<dyn InferenceClient>) -> Arc<Self> {
        Arc::new(Self {
            inference_sem: Arc::new(Semaphore::new(cfg.max_inference_concurrency)),
            snapshot_pool: SnapshotPool::new(cfg.max_lookback_sec),
            cfg,
            api,
            inference,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        vec![RTCIceServer {
            urls: self.cfg.stun_servers.clone(),
            ..Default::default()
        }]
    }

    /// Inserts a session into the registry, enforcing the admission cap
    /// under the write lock. A session replaced under the same id is stopped.
    pub async fn adopt_session(&self, sess: Arc<Session>) -> Result<()> {
        let replaced = {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.cfg.max_sessions {
                metrics::SESSIONS_REJECTED_TOTAL.inc();
                return Err(Error::CapacityReached);
            }
            sessions.insert(sess.id.clone(), sess)
        };
        metrics::SESSIONS_CREATED_TOTAL.inc();
        metrics::ACTIVE_SESSIONS.inc();
        if let Some(old) = replaced {
            metrics::ACTIVE_SESSIONS.dec();
            tokio::spawn(async move { old.stop().await });
        }
        Ok(())
    }

    /// Sets up a full session: codecs, peer connection, outbound track,
    /// "commands" channel, control routing, inbound loop, and ICE teardown.
    /// Returns the SDP offer for the client to answer.
    pub async fn create_session(self: &Arc<Self>, id: &str) -> Result<String> {
        let api = self.api.as_ref().ok_or(Error::NoWebrtcApi)?;

        let sess = Arc::new(Session::new(id, self.cfg.ring_buffer_sec));
        sess.set_codecs(OpusDecoder::new()?, OpusEncoder::new()?);

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers: self.ice_servers(),
                ..Default::default()
            })
            .await?,
        );
        sess.set_peer_connection(pc.clone());

        // Outbound audio: server → browser.
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio-out".to_owned(),
            "voice-gateway".to_owned(),
        ));
        let sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        // Drain RTCP so the interceptor chain keeps flowing.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        sess.set_media_sink(Arc::new(OpusTrackSink::new(track)));

        // The data channel must exist before the offer so its SCTP transport
        // shows up in the SDP.
        let dc = pc
            .create_data_channel(
                "commands",
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        sess.set_control_channel(Arc::new(DataChannelControl::new(dc.clone())));

        let router = Arc::new(Router::new());
        {
            let gw = Arc::downgrade(self);
            let handler_sess = sess.clone();
            router.register("command.enunciate", move |env: &Envelope| {
                let Some(gw) = gw.upgrade() else { return Ok(()) };
                let cmd: CommandEnunciate = serde_json::from_value(env.payload.clone())?;
                let action_id = env
                    .action_id
                    .clone()
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()[..8].to_string());
                gw.handle_enunciate(&handler_sess, action_id, cmd);
                Ok(())
            });
        }

        {
            let session_id = sess.id.clone();
            dc.on_open(Box::new(move || {
                info!(session = %session_id, "data channel opened");
                Box::pin(async {})
            }));
        }
        {
            let session_id = sess.id.clone();
            let router = router.clone();
            dc.on_message(Box::new(move |msg: DataChannelMessage| {
                let router = router.clone();
                let session_id = session_id.clone();
                Box::pin(async move {
                    if let Err(e) = router.dispatch(&msg.data) {
                        warn!(session = %session_id, error = %e, "control dispatch failed");
                    }
                })
            }));
        }

        // Inbound audio: browser mic → ring buffer.
        {
            let inbound_sess = sess.clone();
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                let sess = inbound_sess.clone();
                Box::pin(async move {
                    info!(session = %sess.id, "inbound track added");
                    tokio::spawn(inbound_audio_loop(sess, track));
                })
            }));
        }

        // ICE failure, disconnect, or closure tears the session down.
        {
            let gw = Arc::downgrade(self);
            let session_id = sess.id.clone();
            pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let gw = gw.clone();
                let session_id = session_id.clone();
                Box::pin(async move {
                    info!(session = %session_id, state = %state, "ice state");
                    if matches!(
                        state,
                        RTCIceConnectionState::Failed
                            | RTCIceConnectionState::Disconnected
                            | RTCIceConnectionState::Closed
                    ) {
                        if let Some(gw) = gw.upgrade() {
                            gw.delete_session(&session_id).await;
                        }
                    }
                })
            }));
        }

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;

        let mut gather_complete = pc.gathering_complete_promise().await;
        if tokio::time::timeout(ICE_GATHER_TIMEOUT, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(session = %sess.id, "ice gathering timed out, proceeding with partial candidates");
        }

        let sdp = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Signaling("local description missing after offer".into()))?
            .sdp;

        if let Err(e) = self.adopt_session(sess.clone()).await {
            sess.stop().await;
            return Err(e);
        }

        self.spawn_answer_watchdog(&sess);

        info!(session = %sess.id, sdp_len = sdp.len(), "session created");
        Ok(sdp)
    }

    /// Deletes sessions that never receive an SDP answer within the grace
    /// period; they hold a peer connection that will otherwise idle forever.
    fn spawn_answer_watchdog(self: &Arc<Self>, sess: &Arc<Session>) {
        let grace = Duration::from_secs(self.cfg.session_answer_grace_sec);
        if grace.is_zero() {
            return;
        }
        let gw = Arc::downgrade(self);
        let sess = sess.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if sess.is_answered() || sess.is_stopped() {
                return;
            }
            let Some(gw) = gw.upgrade() else { return };
            let still_registered = gw
                .get_session(&sess.id)
                .await
                .is_some_and(|s| Arc::ptr_eq(&s, &sess));
            if still_registered {
                warn!(session = %sess.id, "no answer within grace period, expiring session");
                metrics::SESSIONS_EXPIRED_TOTAL.inc();
                gw.delete_session(&sess.id).await;
            }
        });
    }

    /// Applies the client's SDP answer.
    pub async fn set_answer(&self, id: &str, sdp_answer: String) -> Result<()> {
        let sess = self
            .get_session(id)
            .await
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        sess.set_remote_description(sdp_answer).await
    }

    /// Removes and stops a session. Idempotent.
    pub async fn delete_session(&self, id: &str) {
        let sess = self.sessions.write().await.remove(id);
        if let Some(sess) = sess {
            sess.stop().await;
            metrics::ACTIVE_SESSIONS.dec();
            info!(session = %id, "session deleted");
        }
    }

    /// Stops every session and closes the inference client.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, sess)| sess).collect()
        };
        for sess in sessions {
            sess.stop().await;
        }
        metrics::ACTIVE_SESSIONS.set(0);
        self.inference.close().await;
        info!("gateway shutdown complete");
    }

    /// Claims the session's action slot (cancelling any predecessor) and
    /// spawns the orchestrator for this action.
    pub fn handle_enunciate(self: &Arc<Self>, sess: &Arc<Session>, action_id: String, cmd: CommandEnunciate) {
        info!(session = %sess.id, action = %action_id, "enunciate command");
        let timeout = Duration::from_secs(self.cfg.action_timeout_sec);
        let scope = sess.try_start_action(&action_id, timeout);

        let gw = self.clone();
        let sess = sess.clone();
        tokio::spawn(async move {
            gw.execute_enunciate(scope, sess, action_id, cmd).await;
        });
    }

    /// Runs one enunciate action to completion, records its outcome, and
    /// always releases the action slot.
    pub async fn execute_enunciate(
        &self,
        scope: ActionScope,
        sess: Arc<Session>,
        action_id: String,
        cmd: CommandEnunciate,
    ) {
        let start = Instant::now();
        metrics::ACTIVE_ACTIONS.inc();

        let outcome = self
            .run_enunciate(&scope, &sess, &action_id, &cmd, start)
            .await;
        if let Some(label) = outcome.label() {
            metrics::ACTIONS_TOTAL.with_label_values(&[label]).inc();
        }

        sess.finish_action(&action_id);
        metrics::ACTIVE_ACTIONS.dec();
    }

    async fn run_enunciate(
        &self,
        scope: &ActionScope,
        sess: &Arc<Session>,
        action_id: &str,
        cmd: &CommandEnunciate,
        start: Instant,
    ) -> ActionOutcome {
        let mut lookback = cmd.lookback_seconds;
        if lookback <= 0 {
            lookback = 5;
        }
        let lookback = (lookback as usize).clamp(1, self.cfg.max_lookback_sec);

        let available = sess.ring_buffer.available_seconds();
        if available < 0.5 {
            warn!(session = %sess.id, action = %action_id, available, "insufficient audio buffer");
            self.send_error(
                sess,
                Some(action_id.to_string()),
                "INSUFFICIENT_AUDIO_BUFFER",
                &format!("only {available:.1}s buffered, need at least 0.5s"),
            )
            .await;
            return ActionOutcome::NoAudio;
        }

        // Fast-fail backpressure: never queue behind the inference pool.
        let permit = match self.inference_sem.clone().try_acquire_owned() {
            Ok(permit) => {
                metrics::INFERENCE_SEM_USED.inc();
                permit
            }
            Err(_) => {
                warn!(session = %sess.id, action = %action_id, "inference pool saturated");
                self.send_error(
                    sess,
                    Some(action_id.to_string()),
                    "RATE_LIMITED",
                    "inference busy, try again",
                )
                .await;
                return ActionOutcome::RateLimited;
            }
        };

        let snapshot_start = Instant::now();
        let mut lease = self.snapshot_pool.acquire();
        let pcm_len = sess.ring_buffer.snapshot_into(lookback, &mut lease);
        let snapshot_ms = snapshot_start.elapsed().as_secs_f64() * 1000.0;
        info!(
            session = %sess.id,
            action = %action_id,
            lookback,
            bytes = pcm_len,
            snapshot_ms,
            "snapshot taken"
        );

        if pcm_len == 0 {
            drop(lease);
            drop(permit);
            metrics::INFERENCE_SEM_USED.dec();
            self.send_error(
                sess,
                Some(action_id.to_string()),
                "INSUFFICIENT_AUDIO_BUFFER",
                "ring buffer empty",
            )
            .await;
            return ActionOutcome::NoAudio;
        }

        // Translation happens service-side, so the task is always plain
        // transcription; the target language rides along.
        let asr_start = Instant::now();
        let asr = self
            .inference
            .transcribe(
                scope,
                &lease[..pcm_len],
                &sess.id,
                action_id,
                "",
                "transcribe",
                &cmd.target_language,
            )
            .await;
        // Recognition has released its borrow; the snapshot buffer and the
        // semaphore slot go back now, not at the end of playback.
        drop(lease);
        drop(permit);
        metrics::INFERENCE_SEM_USED.dec();

        let asr = match asr {
            Ok(asr) => asr,
            Err(e) => {
                return if scope.timed_out() {
                    warn!(session = %sess.id, action = %action_id, "recognition timed out");
                    metrics::INFERENCE_TIMEOUTS_TOTAL.inc();
                    ActionOutcome::Timeout
                } else if scope.is_cancelled() || sess.is_stopped() {
                    info!(session = %sess.id, action = %action_id, "recognition cancelled");
                    ActionOutcome::Cancelled
                } else {
                    error!(session = %sess.id, action = %action_id, error = %e, "recognition failed");
                    self.send_error(sess, Some(action_id.to_string()), "ASR_FAILED", &e.to_string())
                        .await;
                    ActionOutcome::AsrError
                };
            }
        };
        let asr_ms = asr_start.elapsed().as_secs_f64() * 1000.0;
        info!(
            session = %sess.id,
            action = %action_id,
            text = %asr.text,
            language = %asr.language,
            asr_ms,
            "recognition complete"
        );

        let segments: Vec<Segment> = asr
            .segments
            .iter()
            .map(|s| Segment {
                text: s.text.clone(),
                start_time: s.start_time,
                end_time: s.end_time,
                confidence: s.confidence,
            })
            .collect();
        self.send_event(
            sess,
            Some(action_id.to_string()),
            "asr.final",
            serde_json::to_value(EventAsrFinal {
                text: asr.text.clone(),
                language: asr.language.clone(),
                translated_text: asr.translated_text.clone(),
                target_language: asr.target_language.clone(),
                segments,
                inference_ms: asr.inference_ms,
                translate_ms: asr.translate_ms,
            })
            .unwrap_or(Value::Null),
        )
        .await;

        let mut tts_first_chunk_ms = 0.0_f64;

        if !asr.text.is_empty() {
            // Speak the translation when one came back.
            let (tts_text, tts_lang) = if !asr.translated_text.is_empty() {
                (asr.translated_text.as_str(), asr.target_language.as_str())
            } else {
                (asr.text.as_str(), asr.language.as_str())
            };
            let voice = if cmd.tts_options.voice.is_empty() {
                "default"
            } else {
                cmd.tts_options.voice.as_str()
            };
            let speed = if cmd.tts_options.speed <= 0.0 {
                1.0
            } else {
                cmd.tts_options.speed as f32
            };

            self.send_event(
                sess,
                Some(action_id.to_string()),
                "tts.started",
                serde_json::to_value(EventTtsStarted {
                    voice: voice.to_string(),
                })
                .unwrap_or(Value::Null),
            )
            .await;

            let tts_start = Instant::now();
            let stream = match self
                .inference
                .synthesize_stream(scope, tts_text, &sess.id, action_id, voice, tts_lang, speed)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    return if scope.timed_out() {
                        metrics::INFERENCE_TIMEOUTS_TOTAL.inc();
                        ActionOutcome::Timeout
                    } else if scope.is_cancelled() || sess.is_stopped() {
                        ActionOutcome::Cancelled
                    } else {
                        warn!(session = %sess.id, action = %action_id, error = %e, "synthesis start failed");
                        ActionOutcome::TtsError
                    };
                }
            };
            let mut upstream = stream.chunks;
            let mut stream_errors = stream.errors;

            // Proxy that records first-chunk latency ahead of the pacing loop.
            let (chunk_tx, mut paced_rx) = mpsc::channel::<Vec<u8>>(16);
            let (first_tx, mut first_rx) = oneshot::channel::<f64>();
            let proxy_scope = scope.clone();
            tokio::spawn(async move {
                let mut first_tx = Some(first_tx);
                while let Some(chunk) = upstream.recv().await {
                    if let Some(tx) = first_tx.take() {
                        let _ = tx.send(tts_start.elapsed().as_secs_f64() * 1000.0);
                    }
                    tokio::select! {
                        _ = proxy_scope.cancelled() => return,
                        sent = chunk_tx.send(chunk) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            });

            let play_result = sess.play_pcm_stream(scope, &mut paced_rx).await;
            if let Ok(ms) = first_rx.try_recv() {
                tts_first_chunk_ms = ms;
            }

            if let Err(e) = play_result {
                return if scope.timed_out() {
                    warn!(session = %sess.id, action = %action_id, "playback timed out");
                    metrics::INFERENCE_TIMEOUTS_TOTAL.inc();
                    ActionOutcome::Timeout
                } else if scope.is_cancelled() || sess.is_stopped() {
                    info!(session = %sess.id, action = %action_id, "playback cancelled");
                    ActionOutcome::Cancelled
                } else {
                    warn!(session = %sess.id, action = %action_id, error = %e, "playback error");
                    ActionOutcome::TtsError
                };
            }

            if let Ok(e) = stream_errors.try_recv() {
                warn!(session = %sess.id, action = %action_id, error = %e, "synthesis stream error");
            }

            self.send_event(
                sess,
                Some(action_id.to_string()),
                "tts.done",
                serde_json::to_value(EventTtsDone {
                    duration_ms: tts_start.elapsed().as_millis() as u64,
                })
                .unwrap_or(Value::Null),
            )
            .await;
        }

        let translate_ms = asr.translate_ms as f64;
        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.send_event(
            sess,
            Some(action_id.to_string()),
            "metrics.latency",
            serde_json::to_value(EventMetricsLatency {
                snapshot_ms,
                asr_ms,
                translate_ms,
                tts_first_chunk_ms,
                total_ms,
            })
            .unwrap_or(Value::Null),
        )
        .await;

        let latency = &metrics::ACTION_LATENCY_MS;
        latency.with_label_values(&["total"]).observe(total_ms);
        latency.with_label_values(&["snapshot"]).observe(snapshot_ms);
        latency.with_label_values(&["asr"]).observe(asr_ms);
        if translate_ms > 0.0 {
            latency.with_label_values(&["translate"]).observe(translate_ms);
        }
        if tts_first_chunk_ms > 0.0 {
            latency
                .with_label_values(&["tts_first_chunk"])
                .observe(tts_first_chunk_ms);
        }

        info!(
            session = %sess.id,
            action = %action_id,
            snapshot_ms,
            asr_ms,
            translate_ms,
            tts_first_chunk_ms,
            total_ms,
            "enunciate complete"
        );
        ActionOutcome::Success
    }

    /// Sends an event envelope over the session's control channel, logging
    /// (not propagating) transport failures.
    pub(crate) async fn send_event(
        &self,
        sess: &Session,
        action_id: Option<String>,
        kind: &str,
        payload: Value,
    ) {
        let envelope = Envelope::new(kind, sess.id.clone(), action_id, payload);
        if let Err(e) = sess.send_control_message(&envelope).await {
            warn!(session = %sess.id, kind, error = %e, "control send failed");
        }
    }

    /// Sends an `error` event with a code from the fixed taxonomy.
    pub(crate) async fn send_error(
        &self,
        sess: &Session,
        action_id: Option<String>,
        code: &str,
        message: &str,
    ) {
        let payload = serde_json::to_value(EventError {
            code: code.to_string(),
            message: message.to_string(),
        })
        .unwrap_or(Value::Null);
        self.send_event(sess, action_id, "error", payload).await;
    }
}

/// Pulls RTP packets off a remote track and feeds them into the session.
/// Owns the session's decoder for the life of the track.
async fn inbound_audio_loop(sess: Arc<Session>, track: Arc<TrackRemote>) {
    let Some(mut decoder) = sess.take_decoder() else {
        warn!(session = %sess.id, "no decoder available for inbound track");
        return;
    };
    info!(session = %sess.id, "inbound audio loop started");

    loop {
        match track.read_rtp().await {
            Ok((pkt, _)) => {
                sess.handle_inbound_rtp(&mut decoder, pkt.header.sequence_number, &pkt.payload)
            }
            Err(e) => {
                info!(session = %sess.id, error = %e, "inbound audio loop ended");
                return;
            }
        }
    }
}
