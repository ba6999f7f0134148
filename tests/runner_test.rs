//! Runner behavior against real shell children, outside the fleet.

#![cfg(unix)]

use pf::catalog::HealthCheckKind;
use pf::service::runner::{Runner, RunnerConfig, DEFAULT_ERROR_TOKENS};
use pf::service::state::{ServiceState, Status};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn runner_config() -> RunnerConfig {
    RunnerConfig {
        health_interval: Duration::from_secs(60),
        health_timeout: Duration::from_secs(1),
        health_fail_threshold: 2,
        reconnect_base: Duration::from_millis(100),
        reconnect_cap: Duration::from_millis(300),
        max_reconnects: 10,
        grace_window: Duration::from_millis(500),
        health_check: HealthCheckKind::Tcp,
        health_path: None,
        error_tokens: DEFAULT_ERROR_TOKENS.iter().map(|s| s.to_string()).collect(),
        client_cert: None,
    }
}

fn state_for(command: &str, local_port: &str) -> Arc<ServiceState> {
    Arc::new(ServiceState::new(
        "svc".to_string(),
        command.to_string(),
        local_port.to_string(),
        "5432".to_string(),
        CancellationToken::new(),
    ))
}

#[tokio::test]
async fn grace_window_promotes_connecting_to_online() {
    let state = state_for("sleep 10", "25901");
    tokio::spawn(Runner::new(Arc::clone(&state), runner_config()).run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.status(), Status::Connecting);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(state.status(), Status::Online);
    assert!(state.snapshot().online_since.is_some());

    state.cancel();
}

#[tokio::test]
async fn forwarding_banner_short_circuits_the_grace_window() {
    let mut config = runner_config();
    // Grace so long that only the stdout fast path can set Online
    config.grace_window = Duration::from_secs(10);

    let state = state_for("echo 'Forwarding from 127.0.0.1:25902 -> 5432'; sleep 10", "25902");
    tokio::spawn(Runner::new(Arc::clone(&state), config).run());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if state.status() == Status::Online {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(state.status(), Status::Online);

    // The banner also landed in the log ring as a normal line
    let snap = state.snapshot();
    assert!(snap
        .log_history
        .iter()
        .any(|e| e.message.contains("Forwarding from") && !e.is_error));

    state.cancel();
}

#[tokio::test]
async fn cancellation_stops_the_runner_promptly() {
    let state = state_for("sleep 300", "25903");
    let handle = tokio::spawn(Runner::new(Arc::clone(&state), runner_config()).run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    state.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("runner should exit promptly after cancellation")
        .unwrap();
    assert_eq!(state.status(), Status::Stopped);
}

#[tokio::test]
async fn cancellation_preempts_backoff_sleeps() {
    let mut config = runner_config();
    // Long enough that only preemption can explain a fast exit
    config.reconnect_base = Duration::from_secs(30);
    config.reconnect_cap = Duration::from_secs(30);

    let state = state_for("exit 1", "25904");
    let handle = tokio::spawn(Runner::new(Arc::clone(&state), config).run());

    // Let the first run fail and the backoff start
    tokio::time::sleep(Duration::from_millis(500)).await;
    state.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("backoff sleep must be cancellation-aware")
        .unwrap();
    assert_eq!(state.status(), Status::Stopped);
}

#[tokio::test]
async fn benign_stderr_lines_are_logged_but_not_classified() {
    let state = state_for("echo 'Handling connection for 5432' >&2; sleep 10", "25905");
    tokio::spawn(Runner::new(Arc::clone(&state), runner_config()).run());

    tokio::time::sleep(Duration::from_millis(700)).await;

    let snap = state.snapshot();
    assert!(snap
        .log_history
        .iter()
        .any(|e| e.message.contains("Handling connection") && e.is_error));
    assert!(snap.error_history.is_empty());
    assert!(snap.last_error.is_empty());
    assert_eq!(snap.status, Status::Online);

    state.cancel();
}

#[tokio::test]
async fn child_exit_merges_stderr_tail_into_the_error() {
    let state = state_for("echo 'connection to pod lost' >&2; exit 3", "25906");
    tokio::spawn(Runner::new(Arc::clone(&state), runner_config()).run());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let mut seen = false;
    while tokio::time::Instant::now() < deadline {
        let snap = state.snapshot();
        if snap.last_error.contains("connection to pod lost") {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(seen, "stderr tail should become the exit error");

    state.cancel();
}

#[tokio::test]
async fn health_streak_triggers_reconnect_when_port_goes_dark() {
    let mut config = runner_config();
    config.health_interval = Duration::from_millis(100);
    config.health_timeout = Duration::from_millis(200);
    config.grace_window = Duration::from_millis(50);
    // Generous backoff so the state parks in Reconnecting long enough to observe
    config.reconnect_base = Duration::from_secs(5);
    config.reconnect_cap = Duration::from_secs(5);

    // Nothing listens on the port, so probes fail as soon as Online
    let state = state_for("sleep 10", "25907");
    tokio::spawn(Runner::new(Arc::clone(&state), config).run());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut reconnecting = false;
    while tokio::time::Instant::now() < deadline {
        let snap = state.snapshot();
        if snap.status == Status::Reconnecting {
            assert_eq!(snap.last_error, "Connection lost");
            assert!(snap
                .log_history
                .iter()
                .any(|e| e.message.contains("health check failed")));
            reconnecting = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(reconnecting, "probe streak should force a reconnect");

    state.cancel();
}
