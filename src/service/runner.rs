//! The per-service supervisor task.
//!
//! One runner owns one child process at a time and drives the service state
//! machine: spawn → grace window → online, probe while online, classify
//! stderr, respawn with bounded backoff after failures, park in `Error` once
//! the attempt ceiling is hit, and tear the whole process group down on
//! cancellation.

use crate::catalog::HealthCheckKind;
use crate::config::Config;
use crate::process;
use crate::service::health::HealthTracker;
use crate::service::state::{ServiceState, Status};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Stderr substrings (lowercased match) that classify a line as an error.
/// Kept as data so the set stays tunable without touching the reader.
pub const DEFAULT_ERROR_TOKENS: &[&str] = &[
    "error",
    "failed",
    "unable to",
    "cannot",
    "denied",
    "refused",
    "not found",
    "lost connection",
];

/// How long a freshly spawned forward gets before `Connecting` is promoted
/// to `Online` on faith alone.
const DEFAULT_GRACE_WINDOW: Duration = Duration::from_millis(500);

/// Classified messages are clipped to this many chars for the histories.
const ERROR_MESSAGE_LIMIT: usize = 150;

/// Everything a runner needs to know beyond the service identity.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub health_interval: Duration,
    pub health_timeout: Duration,
    pub health_fail_threshold: u32,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnects: u32,
    pub grace_window: Duration,
    pub health_check: HealthCheckKind,
    pub health_path: Option<String>,
    pub error_tokens: Vec<String>,
    /// PEM paths injected into kubectl commands, when a client cert is set up.
    pub client_cert: Option<(String, String)>,
}

impl RunnerConfig {
    pub fn from_config(
        config: &Config,
        health_check: HealthCheckKind,
        health_path: Option<String>,
        client_cert: Option<(String, String)>,
    ) -> Self {
        Self {
            health_interval: config.health_check_interval,
            health_timeout: config.health_check_timeout,
            health_fail_threshold: config.health_check_fail_count,
            reconnect_base: config.reconnect_base,
            reconnect_cap: config.reconnect_cap,
            max_reconnects: config.max_reconnects,
            grace_window: DEFAULT_GRACE_WINDOW,
            health_check,
            health_path,
            error_tokens: DEFAULT_ERROR_TOKENS.iter().map(|s| s.to_string()).collect(),
            client_cert,
        }
    }
}

enum RunOutcome {
    /// Child gone or forward lost; the reconnect loop decides what's next.
    Exited,
    /// Cancellation observed; the runner is done.
    Cancelled,
}

pub struct Runner {
    state: Arc<ServiceState>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(state: Arc<ServiceState>, config: RunnerConfig) -> Self {
        Self { state, config }
    }

    /// Supervise until cancelled. Consumes the runner; meant to be spawned
    /// as its own task.
    pub async fn run(self) {
        let token = self.state.cancel_token();
        let command = prepare_command(&self.state.command, self.config.client_cert.as_ref());
        let mut health = HealthTracker::new(
            self.config.health_check,
            self.config.health_path.clone(),
            self.config.health_timeout,
            self.config.health_fail_threshold,
        );

        let mut first_run = true;
        loop {
            if token.is_cancelled() {
                self.state.set_status(Status::Stopped);
                return;
            }

            if !first_run {
                let attempts = self.state.record_reconnect();

                if attempts >= self.config.max_reconnects {
                    self.state.set_error(format!(
                        "Max reconnect attempts ({}) exceeded",
                        self.config.max_reconnects
                    ));
                    self.state
                        .push_log("MAXIMUM RECONNECT ATTEMPTS REACHED - GIVING UP", true);
                    tracing::error!(service = %self.state.name, "giving up after {} attempts", attempts);
                    // Parked: visible in ERROR until stop/restart.
                    token.cancelled().await;
                    self.state.set_status(Status::Stopped);
                    return;
                }

                let delay = backoff_delay(
                    attempts,
                    self.config.reconnect_base,
                    self.config.reconnect_cap,
                );
                self.state.push_log(
                    format!(
                        "━━━━ RECONNECTING (attempt #{}) in {:.1}s ━━━━",
                        attempts,
                        delay.as_secs_f64()
                    ),
                    false,
                );
                self.state.set_status(Status::Reconnecting);

                tokio::select! {
                    _ = token.cancelled() => {
                        self.state.set_status(Status::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            first_run = false;

            health.reset();
            match self.run_once(&command, &token, &mut health).await {
                RunOutcome::Exited => continue,
                RunOutcome::Cancelled => {
                    self.state.set_status(Status::Stopped);
                    return;
                }
            }
        }
    }

    /// One spawn-to-exit cycle of the child.
    async fn run_once(
        &self,
        command: &str,
        token: &CancellationToken,
        health: &mut HealthTracker,
    ) -> RunOutcome {
        self.state.set_status(Status::Connecting);
        self.state.clear_error();
        self.state.mark_started();
        tracing::info!(service = %self.state.name, "connecting");

        let mut cmd = shell_command(command);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(false);
        process::configure_process_group(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = extract_error_message(&format!("Start failed: {}", e));
                self.state.set_error(msg.clone());
                mirror_to_stderr(&self.state.name, &msg);
                tracing::error!(service = %self.state.name, "spawn failed: {}", e);
                return RunOutcome::Exited;
            }
        };

        let pid = child.id();

        // Pipe readers are taken before anything can block on the child.
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stdout(Arc::clone(&self.state), stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stderr(
                Arc::clone(&self.state),
                stderr,
                self.config.error_tokens.clone(),
                Arc::clone(&stderr_tail),
            ));
        }

        let grace = tokio::time::sleep(self.config.grace_window);
        tokio::pin!(grace);
        let mut grace_pending = true;

        let mut probe_ticks = tokio::time::interval(self.config.health_interval);
        probe_ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so probing starts one
        // interval after spawn.
        probe_ticks.tick().await;

        // Each wait point resolves to a step handled outside the select, so
        // the child handle is free to use again in the handlers.
        enum Step {
            Cancelled,
            GraceElapsed,
            ProbeTick,
            Exited(std::io::Result<std::process::ExitStatus>),
        }

        loop {
            let step = tokio::select! {
                _ = token.cancelled() => Step::Cancelled,
                _ = &mut grace, if grace_pending => Step::GraceElapsed,
                _ = probe_ticks.tick() => Step::ProbeTick,
                exit = child.wait() => Step::Exited(exit),
            };

            match step {
                Step::Cancelled => {
                    if let Some(pid) = pid {
                        process::kill_process_tree(pid);
                    }
                    let _ = child.wait().await;
                    tracing::info!(service = %self.state.name, "stopped by user");
                    return RunOutcome::Cancelled;
                }

                Step::GraceElapsed => {
                    grace_pending = false;
                    if self.state.status() == Status::Connecting {
                        self.state.set_status(Status::Online);
                        tracing::info!(
                            service = %self.state.name,
                            "connected on port {}→{}",
                            self.state.local_port,
                            self.state.remote_port
                        );
                    }
                }

                Step::ProbeTick => {
                    if self.state.status() != Status::Online {
                        health.reset();
                        continue;
                    }
                    if !health.probe(&self.state.local_port).await && health.streak_exceeded() {
                        tracing::warn!(
                            service = %self.state.name,
                            "health probes failing on port {}, reconnecting",
                            self.state.local_port
                        );
                        self.state.set_error_message("Connection lost");
                        self.state.push_log("Connection lost - health check failed", true);
                        self.state.set_status(Status::Reconnecting);
                        if let Some(pid) = pid {
                            process::kill_process_tree(pid);
                        }
                        let _ = child.wait().await;
                        return RunOutcome::Exited;
                    }
                }

                Step::Exited(exit) => {
                    if token.is_cancelled() {
                        return RunOutcome::Cancelled;
                    }

                    // Let the pipe readers drain whatever the child flushed
                    // on its way out.
                    tokio::time::sleep(Duration::from_millis(50)).await;

                    // Prefer the stderr tail over the bare exit status; that's
                    // where kubectl and ssh say what actually went wrong.
                    let tail = {
                        let tail = stderr_tail.lock();
                        tail.iter().cloned().collect::<Vec<_>>().join(" ")
                    };
                    let msg = if !tail.trim().is_empty() {
                        extract_error_message(&tail)
                    } else {
                        match exit {
                            Ok(status) if status.success() => "Connection closed".to_string(),
                            Ok(status) => {
                                extract_error_message(&format!("Process died: {}", status))
                            }
                            Err(e) => extract_error_message(&format!("Process died: {}", e)),
                        }
                    };
                    tracing::warn!(service = %self.state.name, "connection closed: {}", msg);
                    self.state.set_error(msg.clone());
                    mirror_to_stderr(&self.state.name, &msg);
                    return RunOutcome::Exited;
                }
            }
        }
    }
}

/// Build the platform shell invocation for a forward command.
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }

    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Stdout reader: every line lands in the log ring, and kubectl's
/// "Forwarding from" banner short-circuits the grace window.
async fn read_stdout(state: Arc<ServiceState>, stdout: tokio::process::ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        state.push_log(line.clone(), false);

        if line.contains("Forwarding from") && state.status() != Status::Online {
            state.set_status(Status::Online);
            state.clear_error();
        }
    }
}

/// Stderr reader: lines land in the log ring flagged as errors, and lines
/// matching the token set are classified into the error history.
async fn read_stderr(
    state: Arc<ServiceState>,
    stderr: tokio::process::ChildStderr,
    tokens: Vec<String>,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    const TAIL_LINES: usize = 5;

    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        {
            let mut tail = tail.lock();
            tail.push_back(line.clone());
            while tail.len() > TAIL_LINES {
                tail.pop_front();
            }
        }

        state.push_log(line.clone(), true);

        let lowered = line.to_lowercase();
        if tokens.iter().any(|t| lowered.contains(t.as_str())) {
            let msg = extract_error_message(&line);
            state.set_error(msg.clone());
            mirror_to_stderr(&state.name, &msg);
        }
    }
}

/// Rewrite a command before spawning: ssh gets keepalive options so dead
/// tunnels surface within seconds, kubectl gets the configured client
/// certificate unless the command already carries one.
pub fn prepare_command(command: &str, client_cert: Option<&(String, String)>) -> String {
    let mut command = command.to_string();

    if command.contains("ssh") && !command.contains("ServerAliveInterval") {
        command = command.replacen(
            "ssh",
            "ssh -o ServerAliveInterval=2 -o ServerAliveCountMax=2 -o ConnectTimeout=3",
            1,
        );
    }

    if let Some((cert_path, key_path)) = client_cert {
        if command.contains("kubectl") && !command.contains("--client-certificate") {
            command = command.replacen(
                "kubectl ",
                &format!(
                    "kubectl --client-certificate={} --client-key={} ",
                    cert_path, key_path
                ),
                1,
            );
        }
    }

    command
}

/// Exponential backoff with ±10% jitter: `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(cap.as_secs_f64());
    let jitter = capped * 0.1 * rand::thread_rng().gen_range(-1.0..1.0);
    Duration::from_secs_f64((capped + jitter).max(0.0))
}

/// Clip to a single clean line: truncated with an ellipsis, inner whitespace
/// collapsed to single spaces.
pub fn extract_error_message(output: &str) -> String {
    let chars: Vec<char> = output.chars().collect();
    let clipped: String = if chars.len() > ERROR_MESSAGE_LIMIT {
        chars[..ERROR_MESSAGE_LIMIT - 3].iter().collect::<String>() + "..."
    } else {
        output.to_string()
    };
    clipped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `PF_STDERR` duplicates classified errors onto the supervisor's stderr.
fn stderr_enabled() -> bool {
    matches!(
        std::env::var("PF_STDERR")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn mirror_to_stderr(name: &str, msg: &str) {
    if stderr_enabled() {
        eprintln!("[{}] ERROR: {}", name, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_commands_get_keepalive_options() {
        let out = prepare_command("ssh -L 8080:db:80 bastion", None);
        assert!(out.starts_with("ssh -o ServerAliveInterval=2"));
        assert!(out.contains("-L 8080:db:80 bastion"));

        // Already tuned: left alone
        let tuned = "ssh -o ServerAliveInterval=5 -L 1:2 host";
        assert_eq!(prepare_command(tuned, None), tuned);

        // Non-ssh: left alone
        let kubectl = "kubectl port-forward svc/pg 5432:5432";
        assert_eq!(prepare_command(kubectl, None), kubectl);
    }

    #[test]
    fn kubectl_commands_get_client_certificate() {
        let cert = ("/c/cert.pem".to_string(), "/c/key.pem".to_string());
        let out = prepare_command("kubectl port-forward svc/pg 5432:5432", Some(&cert));
        assert!(out.starts_with(
            "kubectl --client-certificate=/c/cert.pem --client-key=/c/key.pem port-forward"
        ));

        // Existing flag wins
        let explicit = "kubectl --client-certificate=/x port-forward svc/pg 5432:5432";
        assert_eq!(prepare_command(explicit, Some(&cert)), explicit);

        // No cert configured: untouched
        let plain = "kubectl port-forward svc/pg 5432:5432";
        assert_eq!(prepare_command(plain, None), plain);
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(30);

        // attempt 1 ≈ 2s ± 10%
        for _ in 0..50 {
            let d = backoff_delay(1, base, cap).as_secs_f64();
            assert!((1.8..=2.2).contains(&d), "attempt 1 delay {} out of range", d);
        }
        // attempt 3 ≈ 8s ± 10%
        for _ in 0..50 {
            let d = backoff_delay(3, base, cap).as_secs_f64();
            assert!((7.2..=8.8).contains(&d), "attempt 3 delay {} out of range", d);
        }
        // attempt 10 hits the 30s cap ± 10%
        for _ in 0..50 {
            let d = backoff_delay(10, base, cap).as_secs_f64();
            assert!((27.0..=33.0).contains(&d), "attempt 10 delay {} out of range", d);
        }
    }

    #[test]
    fn error_messages_are_clipped_and_collapsed() {
        let long = "x".repeat(400);
        let clipped = extract_error_message(&long);
        assert!(clipped.len() <= ERROR_MESSAGE_LIMIT);
        assert!(clipped.ends_with("..."));

        let messy = "error:   unable\tto \n forward";
        assert_eq!(extract_error_message(messy), "error: unable to forward");
    }

    #[test]
    fn default_tokens_cover_the_usual_suspects() {
        let classify = |line: &str| {
            let lowered = line.to_lowercase();
            DEFAULT_ERROR_TOKENS.iter().any(|t| lowered.contains(t))
        };
        assert!(classify("error: unable to forward"));
        assert!(classify("Connection REFUSED by peer"));
        assert!(classify("permission denied (publickey)"));
        assert!(classify("client_loop: send disconnect: Lost connection"));
        assert!(!classify("Forwarding from 127.0.0.1:5432 -> 5432"));
        assert!(!classify("Handling connection for 5432"));
    }
}
