//! Platform process-group control.
//!
//! A forward command spawned through a shell fans out into child processes
//! (the shell, kubectl/ssh, sometimes more). Putting each service in its own
//! process group lets teardown take the whole tree down in one operation.
//! Callers never branch on OS; both entry points compile to the right thing.

use tokio::process::Command;

/// Arrange for the child to land in a fresh process group.
/// Must be called before spawn.
pub fn configure_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// SIGKILL the entire process group rooted at `pid`.
///
/// Best-effort: a group that already exited is not an error. On Unix the
/// group id is resolved from the pid; if that fails (already reaped) the pid
/// itself is signalled as a fallback.
pub fn kill_process_tree(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        if pid == 0 || pid > i32::MAX as u32 {
            tracing::warn!("refusing to signal invalid pid {}", pid);
            return;
        }
        let pid = Pid::from_raw(pid as i32);

        match nix::unistd::getpgid(Some(pid)) {
            Ok(pgid) => {
                if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                    tracing::debug!("killpg({}) failed: {}", pgid, e);
                }
            }
            Err(_) => {
                let _ = kill(pid, Signal::SIGKILL);
            }
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .status()
        {
            tracing::debug!("taskkill /PID {} failed: {}", pid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_tree_takes_down_shell_and_children() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 300");
        configure_process_group(&mut cmd);
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap();

        kill_process_tree(pid);

        let status = tokio::time::timeout(std::time::Duration::from_secs(2), child.wait())
            .await
            .expect("child should exit promptly after group kill")
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn kill_tree_on_dead_pid_is_harmless() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("true");
        configure_process_group(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap();
        let _ = child.wait().await;

        // Already exited; must not panic or error out.
        kill_process_tree(pid);
    }
}
