use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pf", version)]
#[command(about = "Supervise kubectl/ssh port-forwards with auto-reconnect and a terminal UI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new service
    #[command(visible_alias = "a")]
    Add {
        /// Service name
        name: String,
        /// The forward command, e.g. "kubectl port-forward svc/postgres 5432:5432"
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List registered services
    #[command(visible_alias = "l")]
    List,

    /// Run services with the terminal UI
    #[command(visible_alias = "r")]
    Run {
        /// Comma-separated service names, a group name, or "all"
        target: String,
    },

    /// Remove a registered service
    #[command(visible_aliases = ["d", "rm"])]
    Delete {
        /// Service name
        name: String,
    },

    /// Kill all kubectl and ssh processes on this machine
    #[command(visible_alias = "c")]
    Cleanup,

    /// Manage service groups
    #[command(subcommand, visible_alias = "g")]
    Group(GroupCommands),

    /// Manage the global client certificate for kubectl services
    #[command(subcommand)]
    Cert(CertCommands),
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a group of services
    #[command(visible_alias = "a")]
    Add {
        /// Group name
        name: String,
        /// Comma-separated member service names
        services: String,
    },
    /// List all groups
    #[command(visible_aliases = ["ls", "l"])]
    List,
    /// Delete a group
    #[command(visible_aliases = ["rm", "d"])]
    Delete {
        /// Group name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum CertCommands {
    /// Extract a P12 bundle and use it for all kubectl services
    Add {
        /// Path to the .p12 file
        p12: PathBuf,
    },
    /// Show the configured certificate
    #[command(visible_alias = "ls")]
    List,
    /// Remove the configured certificate
    #[command(visible_aliases = ["rm", "delete"])]
    Remove,
}
