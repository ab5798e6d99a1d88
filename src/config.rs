//! Environment-driven configuration. Every key is optional and falls back to
//! a default that works for a single-box deployment.

/// Gateway configuration, normally loaded with [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Media listener hint, logged at startup.
    pub listen_addr: String,
    /// Bind address of the internal HTTP façade.
    pub internal_api_addr: String,
    /// Bind address of the Prometheus endpoint.
    pub metrics_addr: String,
    /// Recognition service address (host:port).
    pub asr_addr: String,
    /// Synthesis service address (host:port).
    pub tts_addr: String,
    /// Per-session ring buffer capacity in seconds.
    pub ring_buffer_sec: usize,
    /// STUN/TURN server URLs.
    pub stun_servers: Vec<String>,
    /// Admission cap on concurrent sessions.
    pub max_sessions: usize,
    /// Upper bound on the enunciate snapshot window in seconds.
    pub max_lookback_sec: usize,
    /// Deadline wrapping one whole enunciate action, in seconds.
    pub action_timeout_sec: u64,
    /// Bound on concurrent inference calls.
    pub max_inference_concurrency: usize,
    /// Grace period before deleting sessions that never got an answer.
    pub session_answer_grace_sec: u64,
    /// Cap on one URL ingest run, in seconds. 0 disables the cap.
    pub max_ingest_duration_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".into(),
            internal_api_addr: "0.0.0.0:9091".into(),
            metrics_addr: "0.0.0.0:9092".into(),
            asr_addr: "localhost:50051".into(),
            tts_addr: "localhost:50052".into(),
            ring_buffer_sec: 60,
            stun_servers: vec!["stun:stun.l.google.com:19302".into()],
            max_sessions: 100,
            max_lookback_sec: 60,
            action_timeout_sec: 60,
            max_inference_concurrency: 4,
            session_answer_grace_sec: 30,
            max_ingest_duration_sec: 3600,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            listen_addr: env_str("LISTEN_ADDR", d.listen_addr),
            internal_api_addr: env_str("INTERNAL_API_ADDR", d.internal_api_addr),
            metrics_addr: env_str("METRICS_ADDR", d.metrics_addr),
            asr_addr: env_str("ASR_ADDR", d.asr_addr),
            tts_addr: env_str("TTS_ADDR", d.tts_addr),
            ring_buffer_sec: env_parse("RING_BUFFER_SEC", d.ring_buffer_sec),
            stun_servers: env_list("STUN_SERVERS", d.stun_servers),
            max_sessions: env_parse("MAX_SESSIONS", d.max_sessions),
            max_lookback_sec: env_parse("MAX_LOOKBACK_SEC", d.max_lookback_sec),
            action_timeout_sec: env_parse("ACTION_TIMEOUT_SEC", d.action_timeout_sec),
            max_inference_concurrency: env_parse(
                "MAX_INFERENCE_CONCURRENCY",
                d.max_inference_concurrency,
            ),
            session_answer_grace_sec: env_parse(
                "SESSION_ANSWER_GRACE_SEC",
                d.session_answer_grace_sec,
            ),
            max_ingest_duration_sec: env_parse("MAX_INGEST_DURATION_SEC", d.max_ingest_duration_sec),
        }
    }
}

fn env_str(key: &str, fallback: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn env_list(key: &str, fallback: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => split_list(&v),
        _ => fallback,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ring_buffer_sec, 60);
        assert_eq!(cfg.max_sessions, 100);
        assert_eq!(cfg.max_lookback_sec, 60);
        assert_eq!(cfg.action_timeout_sec, 60);
        assert_eq!(cfg.max_inference_concurrency, 4);
        assert_eq!(cfg.stun_servers, vec!["stun:stun.l.google.com:19302"]);
    }

    #[test]
    fn list_parsing_splits_and_trims() {
        assert_eq!(
            split_list("stun:a , stun:b,"),
            vec!["stun:a".to_string(), "stun:b".to_string()]
        );
    }
}
