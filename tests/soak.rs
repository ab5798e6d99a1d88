//! Soak scenario: several sessions drive periodic enunciates against the
//! mock client, then everything must drain back to baseline.
//!
//! Long-running; excluded from the default test pass. Run with:
//! `cargo test --test soak -- --ignored`

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_config, test_session, CollectingControl, CollectingSink};
use voice_gateway::control::CommandEnunciate;
use voice_gateway::metrics;
use voice_gateway::{Gateway, MockInferenceClient};

const SOAK_SESSIONS: usize = 5;

fn soak_duration() -> Duration {
    std::env::var("SOAK_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(120))
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "soak test, run explicitly"]
async fn soak_returns_to_baseline_after_shutdown() {
    let mock = MockInferenceClient {
        transcribe_delay: Duration::from_millis(50),
        transcribe_text: "hello world test".into(),
        tts_chunk_delay: Duration::from_millis(10),
        tts_chunk_count: 10,
        tts_chunk_size: 3200,
        ..Default::default()
    };
    let gw = Gateway::new_for_test(test_config(), Arc::new(mock));

    let mut sessions = Vec::new();
    for i in 0..SOAK_SESSIONS {
        let sess = test_session(
            &format!("soak-{i}"),
            CollectingControl::new(),
            CollectingSink::new(),
        );
        gw.adopt_session(sess.clone()).await.unwrap();
        sessions.push(sess);
    }

    let stop = tokio_util::sync::CancellationToken::new();
    let mut workers = Vec::new();

    // Simulated inbound audio: 100 ms of silence per tick.
    for sess in &sessions {
        let sess = sess.clone();
        let stop = stop.clone();
        workers.push(tokio::spawn(async move {
            let silence = vec![0u8; 3200];
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => sess.ring_buffer.write(&silence),
                }
            }
        }));
    }

    // Let the buffers fill past the 0.5 s floor.
    tokio::time::sleep(Duration::from_secs(2)).await;

    // One enunciate per session every 5 seconds.
    for (i, sess) in sessions.iter().enumerate() {
        let gw = gw.clone();
        let sess = sess.clone();
        let stop = stop.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            let mut n = 0usize;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => {
                        n += 1;
                        let action_id = format!("soak-{i}-{n}");
                        let scope = sess.try_start_action(&action_id, Duration::from_secs(30));
                        gw.execute_enunciate(
                            scope,
                            sess.clone(),
                            action_id,
                            CommandEnunciate { lookback_seconds: 5, ..Default::default() },
                        )
                        .await;
                    }
                }
            }
        }));
    }

    tokio::time::sleep(soak_duration()).await;
    stop.cancel();
    for worker in workers {
        worker.await.unwrap();
    }

    gw.shutdown().await;

    // Everything must drain within 10 seconds of shutdown.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let drained = metrics::ACTIVE_ACTIONS.get() == 0
            && metrics::INFERENCE_SEM_USED.get() == 0
            && metrics::ACTIVE_SESSIONS.get() == 0;
        if drained {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "gauges did not return to baseline: actions={} sem={} sessions={}",
            metrics::ACTIVE_ACTIONS.get(),
            metrics::INFERENCE_SEM_USED.get(),
            metrics::ACTIVE_SESSIONS.get()
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    for sess in &sessions {
        assert!(sess.is_stopped());
        assert_eq!(sess.current_action_id(), None);
    }
}
