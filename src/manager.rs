//! The fleet: registry of running services and their lifecycle operations.
//!
//! The registry is the only mutable state shared across tasks. It maps
//! service names to `Arc<ServiceState>` behind a `parking_lot::RwLock`;
//! writes (`start`/`stop`/`stop_all`) hold the lock only across the map
//! mutation itself, never across I/O, sleeps or process operations. Each
//! value is owned for writing by exactly one runner task.

use crate::catalog::{self, Catalog, ServiceDefinition};
use crate::cert::CertStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::port;
use crate::service::runner::{Runner, RunnerConfig};
use crate::service::state::{ServiceSnapshot, ServiceState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pre-flight reclaim: attempts and the wait after each one.
const RECLAIM_ATTEMPTS: u32 = 3;
const RECLAIM_WAIT_STEP: Duration = Duration::from_millis(500);

/// Settle window between cancelling a service and reclaiming its port,
/// giving the process group time to actually die.
const TEARDOWN_SETTLE: Duration = Duration::from_millis(300);

/// Gap between consecutive starts of a list, avoiding lock contention on
/// `~/.kube/config` when several kubectl forwards come up at once.
const START_STAGGER: Duration = Duration::from_millis(500);

/// Gap between the stop and start halves of a restart.
const RESTART_GAP: Duration = Duration::from_millis(500);

pub struct Manager {
    services: RwLock<HashMap<String, Arc<ServiceState>>>,
    catalog: Catalog,
    config: Config,
    cert_store: Option<CertStore>,
    root: CancellationToken,
}

impl Manager {
    pub fn new(catalog: Catalog, config: Config, root: CancellationToken) -> Self {
        // Certificates are optional; a broken store only costs kubectl
        // cert injection.
        let cert_store = match CertStore::open() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!("certificate store unavailable: {}", e);
                None
            }
        };

        Self {
            services: RwLock::new(HashMap::new()),
            catalog,
            config,
            cert_store,
            root,
        }
    }

    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Start a registered service: validate, extract its port pair, reclaim
    /// the local port, then hand a fresh [`ServiceState`] to a runner task
    /// under a child cancellation scope.
    pub async fn start(&self, name: &str) -> Result<()> {
        catalog::validate_service_name(name)?;

        if self.is_running(name) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }

        let definition = self.catalog.get_service(name)?;
        catalog::validate_command(&definition.command)?;

        let (local_port, remote_port) = catalog::extract_ports(&definition.command)
            .ok_or_else(|| Error::PortExtraction(definition.command.clone()))?;

        self.reclaim_port(&local_port).await?;

        let token = self.root.child_token();
        let state = Arc::new(ServiceState::new(
            name.to_string(),
            definition.command.clone(),
            local_port,
            remote_port,
            token,
        ));

        {
            let mut services = self.services.write();
            // Re-check under the write lock; a concurrent start may have won.
            if services.contains_key(name) {
                return Err(Error::AlreadyRunning(name.to_string()));
            }
            services.insert(name.to_string(), Arc::clone(&state));
        }

        let runner = Runner::new(state, self.runner_config(&definition));
        tokio::spawn(runner.run());

        tracing::info!(service = %name, "service started");
        Ok(())
    }

    /// Start several services with a stagger between them. Failures are
    /// returned immediately; already-started services keep running.
    pub async fn start_many(&self, names: &[String]) -> Result<()> {
        for (i, name) in names.iter().enumerate() {
            self.start(name).await?;
            if i + 1 < names.len() {
                tokio::time::sleep(START_STAGGER).await;
            }
        }
        Ok(())
    }

    /// Stop a running service: detach it from the registry, cancel its
    /// scope, then reclaim the port once the process group had its settle
    /// window.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let state = {
            let mut services = self.services.write();
            services
                .remove(name)
                .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?
        };

        state.cancel();

        tokio::time::sleep(TEARDOWN_SETTLE).await;
        port::kill_processes_on_port(&state.local_port);

        tracing::info!(service = %name, "service stopped, port {} reclaimed", state.local_port);
        Ok(())
    }

    /// Stop then start, with a breather in between.
    pub async fn restart(&self, name: &str) -> Result<()> {
        // A service that already fell out of the registry can still be
        // restarted; only the start half is load-bearing.
        let _ = self.stop(name).await;
        tokio::time::sleep(RESTART_GAP).await;
        self.start(name).await
    }

    /// Cancel every scope, then reclaim every port after one shared settle
    /// window. The registry is empty when this returns.
    pub async fn stop_all(&self) {
        let drained: Vec<Arc<ServiceState>> = {
            let mut services = self.services.write();
            services.drain().map(|(_, state)| state).collect()
        };

        if drained.is_empty() {
            return;
        }

        for state in &drained {
            state.cancel();
        }

        tokio::time::sleep(TEARDOWN_SETTLE).await;
        for state in &drained {
            port::kill_processes_on_port(&state.local_port);
        }

        tracing::info!("all services stopped");
    }

    /// Snapshots of every running service, sorted by name for stable display.
    pub fn get_states(&self) -> Vec<ServiceSnapshot> {
        let mut states: Vec<ServiceSnapshot> = self
            .services
            .read()
            .values()
            .map(|state| state.snapshot())
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Catalog names that are not currently running (the add-modal list).
    pub fn available_services(&self) -> Result<Vec<String>> {
        let names = self.catalog.all_service_names()?;
        let services = self.services.read();
        Ok(names
            .into_iter()
            .filter(|name| !services.contains_key(name))
            .collect())
    }

    fn runner_config(&self, definition: &ServiceDefinition) -> RunnerConfig {
        let client_cert = self
            .cert_store
            .as_ref()
            .and_then(|store| store.get().ok().flatten())
            .map(|cert| (cert.cert_path, cert.key_path));

        RunnerConfig::from_config(
            &self.config,
            definition.health_check,
            definition.health_path.clone(),
            client_cert,
        )
    }

    /// Kill whatever holds `port`, retrying with growing waits; error out if
    /// the port is still bound after the final attempt.
    async fn reclaim_port(&self, port: &str) -> Result<()> {
        for attempt in 1..=RECLAIM_ATTEMPTS {
            if !port::is_port_in_use(port) {
                return Ok(());
            }

            tracing::warn!(
                "port {} is in use (attempt {}/{}), killing holders",
                port,
                attempt,
                RECLAIM_ATTEMPTS
            );
            port::kill_processes_on_port(port);

            tokio::time::sleep(RECLAIM_WAIT_STEP * attempt).await;
        }

        if port::is_port_in_use(port) {
            return Err(Error::PortBusy {
                port: port.to_string(),
                attempts: RECLAIM_ATTEMPTS,
            });
        }
        Ok(())
    }
}
