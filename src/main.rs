mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use pf::catalog::Catalog;
use pf::error::Error as PfError;
use pf::output::{CliOutput, UserOutput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let is_tui = matches!(cli.command, Commands::Run { .. });
    if let Err(e) = init_tracing(is_tui) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        let out = CliOutput;
        if let Some(pf_error) = e.downcast_ref::<PfError>() {
            out.error(&pf_error.to_string());
            if let Some(suggestion) = pf_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            out.error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let catalog = Catalog::new();
    let out = CliOutput;
    let out: &dyn UserOutput = &out;

    match &cli.command {
        Commands::Add { name, command } => commands::run_add(&catalog, out, name, command),
        Commands::List => commands::run_list(&catalog, out),
        Commands::Delete { name } => commands::run_delete(&catalog, out, name),
        Commands::Cleanup => commands::run_cleanup(out),
        Commands::Group(group_cmd) => commands::run_group(&catalog, out, group_cmd),
        Commands::Cert(cert_cmd) => commands::run_cert(out, cert_cmd),
        Commands::Run { target } => commands::run_services(catalog, out, target).await,
    }
}

/// TUI mode logs to a file so the alternate screen stays clean; plain
/// commands log to stderr.
fn init_tracing(is_tui: bool) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    if is_tui {
        let log_dir = pf::config::exe_dir().join("logs");
        std::fs::create_dir_all(&log_dir)?;

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("pf.log"))?;

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
