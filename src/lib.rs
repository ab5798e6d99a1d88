//! # voice-gateway
//!
//! Real-time voice interaction gateway: live microphone audio arrives over a
//! WebRTC peer connection, rolls through a per-session ring buffer, and on an
//! in-band `command.enunciate` message the gateway snapshots the recent
//! audio, calls external speech recognition and text-to-speech services, and
//! streams the synthesized reply back over the same media transport.
//!
//! ## Architecture
//!
//! - Inbound: Opus RTP → decode (with packet-loss concealment) → 3:1
//!   downsample to 16 kHz → ring buffer.
//! - Control: a reliable ordered "commands" data channel carrying JSON
//!   envelopes, dispatched by [`control::Router`].
//! - Enunciate: snapshot → recognize → optional translation → streamed
//!   synthesis → 1:3 upsample → Opus encode → sample-paced playback, run
//!   under a per-action cancellation scope with a hard deadline.
//! - Supervision: [`gateway::Gateway`] owns the session registry, the
//!   admission cap, and a non-blocking inference concurrency gate.
//!
//! The `server` binary wires the gateway to its internal HTTP façade and a
//! Prometheus metrics endpoint.

pub mod api;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod ingest;
pub mod metrics;
pub mod pool;
pub mod resample;
pub mod ring_buffer;
pub mod session;
pub mod tone;

pub use config::Config;
pub use control::{CommandEnunciate, Envelope, Router};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use inference::{InferenceClient, MockInferenceClient, RemoteInferenceClient, TranscribeResult};
pub use ring_buffer::RingBuffer;
pub use session::{ActionScope, ControlChannel, MediaSink, Session};
