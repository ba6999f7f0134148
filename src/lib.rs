//! # pf
//!
//! A local supervisor for long-running port-forward subprocesses, typically
//! `kubectl port-forward` or `ssh -L`. Register named services, launch one or
//! more of them, and pf keeps each alive: it probes the forwarded port,
//! classifies failures from stderr, reconnects with bounded backoff, shows
//! live status in a full-screen terminal UI, and takes the whole process tree
//! down on exit.
//!
//! ## Architecture
//!
//! - [`Manager`] owns the fleet: a registry of running services behind a
//!   read-write lock, vending consistent sorted snapshots.
//! - Each service is driven by a [`service::Runner`] task that owns the child
//!   process and is the only writer of its [`service::ServiceState`].
//! - Cancellation flows from one root `CancellationToken` through per-service
//!   child tokens; cancelling the root collapses the entire fleet.
//! - The TUI ([`tui`]) is a single-threaded cooperative loop that samples the
//!   fleet on an adaptive tick and never touches service state directly.

pub mod catalog;
pub mod cert;
pub mod config;
pub mod error;
pub mod manager;
pub mod output;
pub mod port;
pub mod probe;
pub mod process;
pub mod service;
pub mod tui;

pub use catalog::{Catalog, HealthCheckKind, ServiceDefinition};
pub use config::Config;
pub use error::{Error, Result};
pub use manager::Manager;
pub use service::{ServiceSnapshot, Status};
