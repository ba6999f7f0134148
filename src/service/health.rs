//! Probe-kind resolution and the consecutive-failure streak.

use crate::catalog::HealthCheckKind;
use crate::probe::{self, ProbeKind};
use std::time::Duration;

/// Tracks health probing for one service: which probe to use and how many
/// probes in a row have failed.
///
/// `Auto` services start on TCP and try a one-time HTTP upgrade on the first
/// successful TCP probe; once resolved the kind is sticky for the life of
/// the runner.
pub struct HealthTracker {
    kind: HealthCheckKind,
    resolved: Option<ProbeKind>,
    path: String,
    timeout: Duration,
    fail_threshold: u32,
    consecutive_failures: u32,
}

impl HealthTracker {
    pub fn new(
        kind: HealthCheckKind,
        path: Option<String>,
        timeout: Duration,
        fail_threshold: u32,
    ) -> Self {
        let resolved = match kind {
            HealthCheckKind::Tcp => Some(ProbeKind::Tcp),
            HealthCheckKind::Http => Some(ProbeKind::Http),
            HealthCheckKind::Auto => None,
        };
        Self {
            kind,
            resolved,
            path: path.unwrap_or_else(|| "/".to_string()),
            timeout,
            fail_threshold,
            consecutive_failures: 0,
        }
    }

    /// Run one probe. Returns `true` when healthy.
    pub async fn probe(&mut self, port: &str) -> bool {
        let healthy = match self.resolved {
            Some(ProbeKind::Tcp) => probe::probe_tcp(port, self.timeout).await,
            Some(ProbeKind::Http) => probe::probe_http(port, &self.path, self.timeout).await,
            None => {
                // Unresolved auto: a passing TCP probe is the trigger to
                // detect whether the endpoint also speaks HTTP.
                let tcp_ok = probe::probe_tcp(port, self.timeout).await;
                if tcp_ok && self.kind == HealthCheckKind::Auto {
                    self.resolved = Some(probe::auto_detect(port, self.timeout).await);
                }
                tcp_ok
            }
        };

        if healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        healthy
    }

    /// A streak of failures at or past the threshold means the forward is lost.
    pub fn streak_exceeded(&self) -> bool {
        self.consecutive_failures >= self.fail_threshold
    }

    /// Reset the streak (e.g. after a respawn).
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}
