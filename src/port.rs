//! Port reclamation: find and terminate whatever holds a local TCP port.
//!
//! Everything here is best-effort by contract. Missing utilities or unkillable
//! PIDs produce a warning, never an error; callers must re-probe
//! [`is_port_in_use`] after a kill to learn whether the port actually freed.
//! Reclaims for a given port are serialized by the caller (the fleet), never
//! run concurrently.

use std::net::TcpListener;
use std::process::Command;

/// Attempt to bind a passive listener on `0.0.0.0:<port>`; failure to bind
/// means something is holding the port. The listener is dropped immediately
/// on success.
pub fn is_port_in_use(port: &str) -> bool {
    match port.parse::<u16>() {
        Ok(p) => TcpListener::bind(("0.0.0.0", p)).is_err(),
        // Unparseable port: nothing we could bind anyway
        Err(_) => false,
    }
}

/// Best-effort kill of every process currently holding `port`.
///
/// POSIX: `lsof -ti :<port>` then `kill -9`, falling back to
/// `fuser -k <port>/tcp`. Windows: parse `netstat -ano` for lines mentioning
/// the port in any state and `taskkill /F /T` each PID. The current process
/// is never killed, even if it shows up as a holder.
pub fn kill_processes_on_port(port: &str) {
    #[cfg(unix)]
    kill_unix(port);

    #[cfg(windows)]
    kill_windows(port);
}

#[cfg(unix)]
fn kill_unix(port: &str) {
    let current_pid = std::process::id().to_string();

    let output = Command::new("lsof").args(["-ti", &format!(":{}", port)]).output();

    match output {
        Ok(out) if !out.stdout.is_empty() => {
            for pid in String::from_utf8_lossy(&out.stdout).split_whitespace() {
                if pid == current_pid {
                    tracing::debug!("skipping self (PID {}) while reclaiming port {}", pid, port);
                    continue;
                }
                if let Err(e) = Command::new("kill").args(["-9", pid]).status() {
                    tracing::warn!("failed to kill PID {} on port {}: {}", pid, port, e);
                }
            }
        }
        _ => {
            // lsof absent or found nothing; fuser covers minimal systems
            if let Err(e) = Command::new("fuser")
                .args(["-k", &format!("{}/tcp", port)])
                .status()
            {
                tracing::warn!("fuser fallback failed for port {}: {}", port, e);
            }
        }
    }
}

#[cfg(windows)]
fn kill_windows(port: &str) {
    let output = match Command::new("netstat").arg("-ano").output() {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!("netstat failed while reclaiming port {}: {}", port, e);
            return;
        }
    };

    let needle = format!(":{}", port);
    let current_pid = std::process::id().to_string();
    let mut pids: Vec<String> = Vec::new();

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        // Any state counts: LISTENING, ESTABLISHED, TIME_WAIT, CLOSE_WAIT.
        if !line.contains(&needle) {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }
        let pid = fields[fields.len() - 1];
        if pid == "0" || pid == current_pid || pids.iter().any(|p| p == pid) {
            continue;
        }
        pids.push(pid.to_string());
    }

    for pid in pids {
        if let Err(e) = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid])
            .status()
        {
            tracing::warn!("taskkill {} failed for port {}: {}", pid, port, e);
        }
    }
}
