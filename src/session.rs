//! Per-connection state: the ring buffer, codecs, media sink, control
//! channel, sequence tracker, and the single active-action slot.
//!
//! Ownership rules the rest of the crate relies on:
//! - the Opus decoder is taken by the inbound media task and never returns;
//! - the Opus encoder is locked for the duration of one playback;
//! - the active-action slot holds at most one action, and starting a new one
//!   cancels the previous holder before claiming the slot.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::media::Sample;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::codec::{OpusDecoder, OpusEncoder, SAMPLES_PER_FRAME};
use crate::control::Envelope;
use crate::error::{Error, Result};
use crate::ingest::{IngestSource, IngestStatus};
use crate::metrics;
use crate::pool::{self, InboundFrameBuffers};
use crate::resample;
use crate::ring_buffer::RingBuffer;

/// Real-time duration of one outbound frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Samples per 20 ms frame at 16 kHz, before upsampling.
const FRAME_SAMPLES_16K: usize = 320;

/// Largest Opus packet the encoder may produce.
const MAX_PACKET_BYTES: usize = 1500;

/// Sequence gaps at or above this are a resync, not a loss to conceal.
const RESYNC_GAP: u16 = 100;

const REASON_PENDING: u8 = 0;
const REASON_TIMEOUT: u8 = 1;
const REASON_CANCELLED: u8 = 2;

/// Cancellable, time-bounded context for one action. Clones share the same
/// token and cancel reason.
#[derive(Clone)]
pub struct ActionScope {
    token: CancellationToken,
    reason: Arc<AtomicU8>,
}

impl ActionScope {
    fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::new(AtomicU8::new(REASON_PENDING)),
        }
    }

    /// Completes once the scope is cancelled, superseded, or timed out.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when the scope ended by hitting its deadline rather than by
    /// supersede or session stop.
    pub fn timed_out(&self) -> bool {
        self.reason.load(Ordering::SeqCst) == REASON_TIMEOUT
    }

    fn cancel_with(&self, reason: u8) {
        // First cause wins; a late timer firing cannot relabel a supersede.
        let _ = self.reason.compare_exchange(
            REASON_PENDING,
            reason,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.token.cancel();
    }
}

/// Outbound sample-paced media seam. The real implementation wraps the
/// WebRTC track; tests substitute a collector.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Submits one encoded frame stamped with its real-time duration.
    async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<()>;
}

/// Reliable ordered control-message seam over the data channel.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;
}

/// [`MediaSink`] over a local Opus track.
pub struct OpusTrackSink {
    track: Arc<TrackLocalStaticSample>,
}

impl OpusTrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl MediaSink for OpusTrackSink {
    async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

/// [`ControlChannel`] over a WebRTC data channel.
pub struct DataChannelControl {
    channel: Arc<RTCDataChannel>,
}

impl DataChannelControl {
    pub fn new(channel: Arc<RTCDataChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ControlChannel for DataChannelControl {
    async fn send_text(&self, text: String) -> Result<()> {
        self.channel.send_text(text).await?;
        Ok(())
    }
}

#[derive(Default)]
struct SeqTracker {
    last_seq: u16,
    initialized: bool,
}

struct ActionSlot {
    action_id: String,
    scope: ActionScope,
}

/// One WebRTC voice session.
pub struct Session {
    pub id: String,
    pub ring_buffer: Arc<RingBuffer>,
    decoder: StdMutex<Option<OpusDecoder>>,
    encoder: TokioMutex<Option<OpusEncoder>>,
    peer_connection: StdMutex<Option<Arc<RTCPeerConnection>>>,
    media_sink: StdMutex<Option<Arc<dyn MediaSink>>>,
    control: StdMutex<Option<Arc<dyn ControlChannel>>>,
    seq: StdMutex<SeqTracker>,
    action: StdMutex<Option<ActionSlot>>,
    stop_signal: CancellationToken,
    stopped: AtomicBool,
    answered: AtomicBool,
    ring_writes_suppressed: AtomicBool,
    ingest: StdMutex<Option<Arc<dyn IngestSource>>>,
}

impl Session {
    /// Creates a session with a ring buffer of the given duration.
    pub fn new(id: impl Into<String>, ring_buffer_seconds: usize) -> Self {
        Self {
            id: id.into(),
            ring_buffer: Arc::new(RingBuffer::new(ring_buffer_seconds)),
            decoder: StdMutex::new(None),
            encoder: TokioMutex::new(None),
            peer_connection: StdMutex::new(None),
            media_sink: StdMutex::new(None),
            control: StdMutex::new(None),
            seq: StdMutex::new(SeqTracker::default()),
            action: StdMutex::new(None),
            stop_signal: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            answered: AtomicBool::new(false),
            ring_writes_suppressed: AtomicBool::new(false),
            ingest: StdMutex::new(None),
        }
    }

    /// Installs the codec pair. Called once during wiring, before the
    /// inbound loop or any playback starts.
    pub fn set_codecs(&self, decoder: OpusDecoder, encoder: OpusEncoder) {
        *self.decoder.lock().unwrap() = Some(decoder);
        match self.encoder.try_lock() {
            Ok(mut slot) => *slot = Some(encoder),
            Err(_) => warn!(session = %self.id, "encoder slot busy during wiring"),
        }
    }

    pub fn set_peer_connection(&self, pc: Arc<RTCPeerConnection>) {
        *self.peer_connection.lock().unwrap() = Some(pc);
    }

    pub fn set_media_sink(&self, sink: Arc<dyn MediaSink>) {
        *self.media_sink.lock().unwrap() = Some(sink);
    }

    pub fn set_control_channel(&self, channel: Arc<dyn ControlChannel>) {
        *self.control.lock().unwrap() = Some(channel);
    }

    /// Hands the decoder to the inbound media task. The decoder is not
    /// thread-safe, so it moves into its owning task and never comes back.
    pub fn take_decoder(&self) -> Option<OpusDecoder> {
        self.decoder.lock().unwrap().take()
    }

    /// Applies the client's SDP answer to the peer connection.
    pub async fn set_remote_description(&self, sdp_answer: String) -> Result<()> {
        let pc = self
            .peer_connection
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::SessionStopped)?;
        let answer = RTCSessionDescription::answer(sdp_answer)?;
        pc.set_remote_description(answer).await?;
        self.answered.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// True once a remote description has been applied.
    pub fn is_answered(&self) -> bool {
        self.answered.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Processes one inbound RTP packet on the media-receive task.
    ///
    /// Gap handling uses unsigned 16-bit modular arithmetic: a positive gap
    /// below [`RESYNC_GAP`] is concealed with one PLC frame per missing
    /// packet; larger jumps resync without inflating the buffer; duplicates
    /// and late reordered packets are dropped.
    pub fn handle_inbound_rtp(&self, decoder: &mut OpusDecoder, seq_num: u16, payload: &[u8]) {
        metrics::RTP_PACKETS_TOTAL.inc();
        if self.is_stopped() {
            return;
        }

        let missing = {
            let mut tracker = self.seq.lock().unwrap();
            if !tracker.initialized {
                tracker.initialized = true;
                tracker.last_seq = seq_num;
                0
            } else {
                let delta = seq_num.wrapping_sub(tracker.last_seq);
                if delta == 0 || delta >= 0x8000 {
                    return;
                }
                tracker.last_seq = seq_num;
                if delta >= RESYNC_GAP {
                    debug!(session = %self.id, delta, "sequence jump, resyncing without plc");
                    0
                } else if delta > 1 {
                    metrics::RTP_GAPS_TOTAL.inc();
                    delta - 1
                } else {
                    0
                }
            }
        };

        let mut bufs = pool::acquire_inbound();

        for _ in 0..missing {
            match decoder.decode_plc(SAMPLES_PER_FRAME, &mut bufs.decode) {
                Ok(samples) => self.store_decoded(&mut bufs, samples),
                Err(e) => {
                    metrics::OPUS_DECODE_ERRORS_TOTAL.inc();
                    warn!(session = %self.id, error = %e, "plc decode failed");
                }
            }
        }

        match decoder.decode(payload, &mut bufs.decode) {
            Ok(samples) => self.store_decoded(&mut bufs, samples),
            Err(e) => {
                metrics::OPUS_DECODE_ERRORS_TOTAL.inc();
                warn!(session = %self.id, error = %e, "opus decode failed, frame dropped");
            }
        }
    }

    /// Downsamples one decoded 48 kHz frame and appends it to the ring
    /// buffer, unless an ingest source currently owns the buffer.
    fn store_decoded(&self, bufs: &mut InboundFrameBuffers, samples: usize) {
        let n16 = resample::downsample_48_to_16_into(&bufs.decode[..samples], &mut bufs.downsample);
        let nbytes = resample::samples_to_bytes_into(&bufs.downsample[..n16], &mut bufs.bytes);
        if !self.ring_writes_suppressed.load(Ordering::SeqCst) {
            self.ring_buffer.write(&bufs.bytes[..nbytes]);
        }
    }

    /// Claims the action slot, cancelling any previous holder, and returns a
    /// scope bounded by `timeout` and the session stop signal.
    pub fn try_start_action(&self, action_id: &str, timeout: Duration) -> ActionScope {
        let mut slot = self.action.lock().unwrap();
        if let Some(prev) = slot.take() {
            info!(session = %self.id, superseded = %prev.action_id, by = %action_id, "action superseded");
            prev.scope.cancel_with(REASON_CANCELLED);
        }

        let scope = ActionScope::child_of(&self.stop_signal);
        let timer_scope = scope.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => timer_scope.cancel_with(REASON_TIMEOUT),
                _ = timer_scope.cancelled() => {}
            }
        });

        *slot = Some(ActionSlot {
            action_id: action_id.to_string(),
            scope: scope.clone(),
        });
        scope
    }

    /// Clears the slot if `action_id` still owns it; cancelling the scope
    /// releases the deadline timer. No-op for superseded actions.
    pub fn finish_action(&self, action_id: &str) {
        let mut slot = self.action.lock().unwrap();
        if slot.as_ref().is_some_and(|s| s.action_id == action_id) {
            if let Some(finished) = slot.take() {
                finished.scope.cancel_with(REASON_CANCELLED);
            }
        }
    }

    /// Id of the action currently holding the slot, if any.
    pub fn current_action_id(&self) -> Option<String> {
        self.action
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.action_id.clone())
    }

    /// Plays a stream of 16 kHz PCM chunks to the media sink in real time.
    ///
    /// Chunks accumulate in a residual buffer; every 320 samples become one
    /// 20 ms Opus frame, submitted and then paced with a per-frame sleep.
    /// Returns when the input closes (residual is zero-padded out), or with
    /// an error on cancellation, session stop, or a sink failure.
    pub async fn play_pcm_stream(
        &self,
        scope: &ActionScope,
        chunks: &mut mpsc::Receiver<Vec<u8>>,
    ) -> Result<()> {
        let sink = self
            .media_sink
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::SessionStopped)?;
        let mut encoder_slot = self.encoder.lock().await;
        let encoder = encoder_slot.as_mut().ok_or(Error::SessionStopped)?;

        let mut residual: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES_16K * 8);
        let mut frame48 = [0i16; SAMPLES_PER_FRAME];
        let mut packet = [0u8; MAX_PACKET_BYTES];

        loop {
            let chunk = tokio::select! {
                _ = scope.cancelled() => return Err(Error::ActionCancelled),
                _ = self.stop_signal.cancelled() => return Err(Error::SessionStopped),
                chunk = chunks.recv() => chunk,
            };
            let Some(chunk) = chunk else { break };
            residual.extend(resample::bytes_to_samples(&chunk));

            let mut consumed = 0;
            while residual.len() - consumed >= FRAME_SAMPLES_16K {
                let frame = &residual[consumed..consumed + FRAME_SAMPLES_16K];
                self.emit_frame(scope, sink.as_ref(), encoder, frame, &mut frame48, &mut packet)
                    .await?;
                consumed += FRAME_SAMPLES_16K;
            }
            residual.drain(..consumed);
        }

        if !residual.is_empty() {
            residual.resize(FRAME_SAMPLES_16K, 0);
            let frame = residual.clone();
            self.emit_frame(scope, sink.as_ref(), encoder, &frame, &mut frame48, &mut packet)
                .await?;
        }
        Ok(())
    }

    async fn emit_frame(
        &self,
        scope: &ActionScope,
        sink: &dyn MediaSink,
        encoder: &mut OpusEncoder,
        samples_16k: &[i16],
        frame48: &mut [i16; SAMPLES_PER_FRAME],
        packet: &mut [u8],
    ) -> Result<()> {
        resample::upsample_16_to_48_into(samples_16k, frame48);
        match encoder.encode(frame48, packet) {
            Ok(len) => {
                // Fresh copy per submit; the transport may retain the slice.
                sink.write_frame(Bytes::copy_from_slice(&packet[..len]), FRAME_DURATION)
                    .await?;
            }
            Err(e) => {
                metrics::OPUS_ENCODE_ERRORS_TOTAL.inc();
                warn!(session = %self.id, error = %e, "opus encode failed, frame skipped");
            }
        }

        // Per-frame sleep pacing. Jitter of a few ms beats bursty catch-up,
        // so no cumulative wake-at-target correction.
        tokio::select! {
            _ = scope.cancelled() => Err(Error::ActionCancelled),
            _ = self.stop_signal.cancelled() => Err(Error::SessionStopped),
            _ = tokio::time::sleep(FRAME_DURATION) => Ok(()),
        }
    }

    /// Serializes an envelope and writes it to the control channel. No-op
    /// when no channel is wired.
    pub async fn send_control_message(&self, envelope: &Envelope) -> Result<()> {
        let Some(control) = self.control.lock().unwrap().clone() else {
            return Ok(());
        };
        let text = serde_json::to_string(envelope)?;
        control.send_text(text).await
    }

    /// Suppresses or restores ring-buffer writes from the inbound media
    /// task. Used while a URL ingest source owns the buffer.
    pub fn set_ring_writes_suppressed(&self, suppressed: bool) {
        self.ring_writes_suppressed.store(suppressed, Ordering::SeqCst);
    }

    /// Registers an ingest source, replacing (and stopping) any previous one
    /// and suppressing microphone writes while it runs.
    pub fn set_ingest_source(&self, source: Arc<dyn IngestSource>) {
        self.stop_ingest();
        *self.ingest.lock().unwrap() = Some(source);
        self.set_ring_writes_suppressed(true);
    }

    /// Stops and clears the ingest source, restoring microphone writes.
    /// Idempotent.
    pub fn stop_ingest(&self) {
        if let Some(source) = self.ingest.lock().unwrap().take() {
            source.stop();
        }
        self.set_ring_writes_suppressed(false);
    }

    pub fn ingest_status(&self) -> Option<IngestStatus> {
        self.ingest.lock().unwrap().as_ref().map(|s| s.status())
    }

    /// Tears the session down: cancels the active action, stops ingest,
    /// fires the stop signal, and closes the peer connection. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(slot) = self.action.lock().unwrap().take() {
            slot.scope.cancel_with(REASON_CANCELLED);
        }
        self.stop_ingest();
        self.stop_signal.cancel();

        let pc = self.peer_connection.lock().unwrap().take();
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                warn!(session = %self.id, error = %e, "peer connection close failed");
            }
        }
        info!(session = %self.id, "session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::BYTES_PER_SECOND;
    use std::sync::Mutex;

    struct CollectingSink {
        frames: Mutex<Vec<(usize, Duration)>>,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MediaSink for CollectingSink {
        async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<()> {
            self.frames.lock().unwrap().push((data.len(), duration));
            Ok(())
        }
    }

    fn encoded_silence() -> Vec<u8> {
        let mut enc = OpusEncoder::new().unwrap();
        let mut packet = [0u8; 1500];
        let len = enc.encode(&[0i16; SAMPLES_PER_FRAME], &mut packet).unwrap();
        packet[..len].to_vec()
    }

    fn buffered_bytes(sess: &Session) -> usize {
        (sess.ring_buffer.available_seconds() * BYTES_PER_SECOND as f64).round() as usize
    }

    #[test]
    fn inbound_frames_fill_the_ring_buffer() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();

        sess.handle_inbound_rtp(&mut dec, 10, &packet);
        // One 20 ms frame: 320 samples at 16 kHz, two bytes each.
        assert_eq!(buffered_bytes(&sess), 640);
    }

    #[test]
    fn sequence_gap_is_concealed_with_plc() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();
        let gaps_before = metrics::RTP_GAPS_TOTAL.get();

        sess.handle_inbound_rtp(&mut dec, 10, &packet);
        sess.handle_inbound_rtp(&mut dec, 15, &packet);

        // 1 initial + 4 concealed + 1 decoded = 6 frames of 20 ms.
        assert_eq!(buffered_bytes(&sess), 6 * 640);
        // Gap tests run in parallel against the global counter.
        assert!(metrics::RTP_GAPS_TOTAL.get() >= gaps_before + 1);
    }

    #[test]
    fn sequence_gap_wraps_mod_2_16() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();

        sess.handle_inbound_rtp(&mut dec, 65534, &packet);
        sess.handle_inbound_rtp(&mut dec, 1, &packet);

        // 65534 → 1 wraps to a gap of 3: two concealed frames plus the
        // decoded one.
        assert_eq!(buffered_bytes(&sess), 4 * 640);
    }

    #[test]
    fn large_gap_resyncs_without_plc() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();

        sess.handle_inbound_rtp(&mut dec, 10, &packet);
        sess.handle_inbound_rtp(&mut dec, 500, &packet);

        assert_eq!(buffered_bytes(&sess), 2 * 640);
    }

    #[test]
    fn late_and_duplicate_packets_are_dropped() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();

        sess.handle_inbound_rtp(&mut dec, 10, &packet);
        sess.handle_inbound_rtp(&mut dec, 10, &packet); // duplicate
        sess.handle_inbound_rtp(&mut dec, 9, &packet); // late
        assert_eq!(buffered_bytes(&sess), 640);

        // The tracker did not rewind: the next in-order packet still works.
        sess.handle_inbound_rtp(&mut dec, 11, &packet);
        assert_eq!(buffered_bytes(&sess), 2 * 640);
    }

    #[test]
    fn suppression_blocks_ring_writes() {
        let sess = Session::new("s", 10);
        let mut dec = OpusDecoder::new().unwrap();
        let packet = encoded_silence();

        sess.set_ring_writes_suppressed(true);
        sess.handle_inbound_rtp(&mut dec, 1, &packet);
        assert_eq!(buffered_bytes(&sess), 0);

        sess.set_ring_writes_suppressed(false);
        sess.handle_inbound_rtp(&mut dec, 2, &packet);
        assert_eq!(buffered_bytes(&sess), 640);
    }

    #[tokio::test]
    async fn starting_an_action_cancels_the_previous_one() {
        let sess = Session::new("s", 1);
        let a = sess.try_start_action("a", Duration::from_secs(5));
        assert!(!a.is_cancelled());

        let b = sess.try_start_action("b", Duration::from_secs(5));
        assert!(a.is_cancelled());
        assert!(!a.timed_out());
        assert!(!b.is_cancelled());

        // The superseded owner can no longer clear the slot.
        sess.finish_action("a");
        assert_eq!(sess.current_action_id().as_deref(), Some("b"));

        sess.finish_action("b");
        assert_eq!(sess.current_action_id(), None);
    }

    #[tokio::test]
    async fn action_deadline_is_reported_as_timeout() {
        let sess = Session::new("s", 1);
        let scope = sess.try_start_action("a", Duration::from_millis(30));
        scope.cancelled().await;
        assert!(scope.timed_out());
    }

    #[tokio::test]
    async fn stop_cancels_the_active_action() {
        let sess = Session::new("s", 1);
        let scope = sess.try_start_action("a", Duration::from_secs(5));
        sess.stop().await;
        assert!(scope.is_cancelled());
        assert!(!scope.timed_out());
        assert!(sess.is_stopped());
        // Idempotent.
        sess.stop().await;
    }

    #[tokio::test]
    async fn playback_paces_and_pads_the_residual() {
        let sess = Session::new("s", 1);
        sess.set_codecs(OpusDecoder::new().unwrap(), OpusEncoder::new().unwrap());
        let sink = CollectingSink::new();
        sess.set_media_sink(sink.clone());

        let scope = sess.try_start_action("a", Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(4);
        // 640 bytes = exactly one frame; 320 bytes = half a frame, padded.
        tx.send(vec![0u8; 640]).await.unwrap();
        tx.send(vec![0u8; 640]).await.unwrap();
        tx.send(vec![0u8; 320]).await.unwrap();
        drop(tx);

        sess.play_pcm_stream(&scope, &mut rx).await.unwrap();

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames
            .iter()
            .all(|(len, dur)| *len > 0 && *dur == FRAME_DURATION));
    }

    #[tokio::test]
    async fn playback_returns_promptly_on_cancellation() {
        let sess = Arc::new(Session::new("s", 1));
        sess.set_codecs(OpusDecoder::new().unwrap(), OpusEncoder::new().unwrap());
        sess.set_media_sink(CollectingSink::new());

        let scope = sess.try_start_action("a", Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);

        let play_sess = sess.clone();
        let play_scope = scope.clone();
        let handle =
            tokio::spawn(async move { play_sess.play_pcm_stream(&play_scope, &mut rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sess.try_start_action("b", Duration::from_secs(5));

        let result = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("playback must return within 100ms")
            .unwrap();
        assert!(matches!(result, Err(Error::ActionCancelled)));
        drop(tx);
    }
}
