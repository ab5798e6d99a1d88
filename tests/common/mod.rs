//! Shared test doubles: sessions wired to collecting sinks instead of a
//! real peer connection.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use voice_gateway::codec::{OpusDecoder, OpusEncoder};
use voice_gateway::control::Envelope;
use voice_gateway::session::{ControlChannel, MediaSink};
use voice_gateway::{Config, Result, Session};

/// Control channel that parses every outbound envelope and keeps it.
pub struct CollectingControl {
    sent: Mutex<Vec<Envelope>>,
}

impl CollectingControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.envelopes().into_iter().map(|e| e.kind).collect()
    }

    pub fn first_of(&self, kind: &str) -> Option<Envelope> {
        self.envelopes().into_iter().find(|e| e.kind == kind)
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.envelopes().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl ControlChannel for CollectingControl {
    async fn send_text(&self, text: String) -> Result<()> {
        let envelope: Envelope = serde_json::from_str(&text).expect("outbound envelope is json");
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }
}

/// Media sink that records submitted frame sizes.
pub struct CollectingSink {
    frames: Mutex<Vec<usize>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaSink for CollectingSink {
    async fn write_frame(&self, data: Bytes, _duration: Duration) -> Result<()> {
        self.frames.lock().unwrap().push(data.len());
        Ok(())
    }
}

/// Builds a session wired with real codecs and the given test doubles.
pub fn test_session(
    id: &str,
    control: Arc<CollectingControl>,
    sink: Arc<CollectingSink>,
) -> Arc<Session> {
    let sess = Arc::new(Session::new(id, 10));
    sess.set_codecs(
        OpusDecoder::new().expect("decoder"),
        OpusEncoder::new().expect("encoder"),
    );
    sess.set_control_channel(control);
    sess.set_media_sink(sink);
    sess
}

/// Writes `seconds` of silence into the session's ring buffer.
pub fn prefill(sess: &Session, seconds: f64) {
    let bytes = (seconds * 32000.0) as usize;
    sess.ring_buffer.write(&vec![0u8; bytes]);
}

pub fn test_config() -> Config {
    Config {
        ring_buffer_sec: 10,
        max_lookback_sec: 10,
        ..Config::default()
    }
}
