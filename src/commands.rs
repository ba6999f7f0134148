//! Command handlers behind the CLI surface.

use crate::cli::{CertCommands, GroupCommands};
use anyhow::bail;
use pf::catalog::Catalog;
use pf::cert::CertStore;
use pf::config::Config;
use pf::error::Error;
use pf::manager::Manager;
use pf::output::UserOutput;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn run_add(catalog: &Catalog, out: &dyn UserOutput, name: &str, parts: &[String]) -> anyhow::Result<()> {
    let command = parts.join(" ");
    catalog.add_service(name, &command)?;
    out.success(&format!("Service '{}' added", name));
    Ok(())
}

pub fn run_list(catalog: &Catalog, out: &dyn UserOutput) -> anyhow::Result<()> {
    let services = catalog.list_services()?;
    if services.is_empty() {
        out.status("No services found");
        return Ok(());
    }

    out.status("\nServices:\n");
    for (i, (name, def)) in services.iter().enumerate() {
        let mut command = def.command.clone();
        if command.chars().count() > 70 {
            command = command.chars().take(67).collect::<String>() + "...";
        }
        out.status(&format!("  {}. {}", i + 1, name));
        out.status(&format!("     → {}", command));
    }
    out.status("");
    Ok(())
}

pub fn run_delete(catalog: &Catalog, out: &dyn UserOutput, name: &str) -> anyhow::Result<()> {
    catalog.delete_service(name)?;
    out.success(&format!("Service '{}' deleted", name));
    Ok(())
}

/// Brute-force sweep: kill every kubectl and ssh process on the machine.
pub fn run_cleanup(out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status("Cleaning up kubectl and ssh processes...");

    #[cfg(unix)]
    {
        let _ = std::process::Command::new("pkill").args(["-9", "kubectl"]).status();
        let _ = std::process::Command::new("pkill").args(["-9", "ssh"]).status();
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/IM", "kubectl.exe"])
            .status();
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/IM", "ssh.exe"])
            .status();
    }

    out.success("Cleanup complete");
    out.status("Note: This kills ALL kubectl and ssh processes");
    Ok(())
}

pub fn run_group(catalog: &Catalog, out: &dyn UserOutput, cmd: &GroupCommands) -> anyhow::Result<()> {
    match cmd {
        GroupCommands::Add { name, services } => {
            let members: Vec<String> = services
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if members.is_empty() {
                bail!("a group needs at least one service");
            }
            catalog.add_group(name, &members)?;
            out.success(&format!("Group '{}' created with {} services", name, members.len()));
        }
        GroupCommands::List => {
            let groups = catalog.list_groups()?;
            if groups.is_empty() {
                out.status("No groups found");
                out.status("Use 'pf group add <name> <services>' to create a group");
                return Ok(());
            }
            out.status("\nGroups:\n");
            for (i, (name, members)) in groups.iter().enumerate() {
                out.status(&format!("  {}. {} ({} services)", i + 1, name, members.len()));
                out.status(&format!("     → {}", members.join(", ")));
            }
            out.status("");
        }
        GroupCommands::Delete { name } => {
            catalog.delete_group(name)?;
            out.success(&format!("Group '{}' deleted", name));
        }
    }
    Ok(())
}

pub fn run_cert(out: &dyn UserOutput, cmd: &CertCommands) -> anyhow::Result<()> {
    let store = CertStore::open()?;

    match cmd {
        CertCommands::Add { p12 } => {
            print!("🔐 P12 password (press Enter if none): ");
            std::io::stdout().flush()?;
            let mut password = String::new();
            std::io::stdin().read_line(&mut password)?;
            let password = password.trim_end_matches(['\n', '\r']);

            store.add(p12, password)?;
            out.success("Certificate added successfully");
            out.status("  This certificate will be used for all kubectl services");
        }
        CertCommands::List => match store.get()? {
            None => {
                out.status("No certificate configured");
                out.status("Use 'pf cert add <p12-file>' to add a certificate");
            }
            Some(config) => {
                out.status("\n📜 Configured Certificate:\n");
                out.status(&format!("  P12:  {}", config.p12_path));
                out.status(&format!("  Cert: {}", config.cert_path));
                out.status(&format!("  Key:  {}", config.key_path));
                out.status("");
            }
        },
        CertCommands::Remove => {
            store.remove()?;
            out.success("Certificate removed successfully");
        }
    }
    Ok(())
}

/// Resolve the `run` target to a service list, start everything, hand over
/// to the TUI, and tear the fleet down when it returns.
pub async fn run_services(catalog: Catalog, out: &dyn UserOutput, target: &str) -> anyhow::Result<()> {
    let names = resolve_target(&catalog, out, target)?;

    // Fail fast on unknown names before anything spawns
    for name in &names {
        catalog.get_service(name)?;
    }

    let config = Config::load()?;
    let root = CancellationToken::new();
    let manager = Arc::new(Manager::new(catalog, config, root));

    if let Err(e) = manager.start_many(&names).await {
        out.warning("stopping services that already started");
        manager.stop_all().await;
        return Err(e.into());
    }

    pf::tui::run(Arc::clone(&manager)).await
}

fn resolve_target(catalog: &Catalog, out: &dyn UserOutput, target: &str) -> anyhow::Result<Vec<String>> {
    if target == "all" {
        let names = catalog.all_service_names()?;
        if names.is_empty() {
            bail!("No services found");
        }
        out.status(&format!("Running all {} services...", names.len()));
        return Ok(names);
    }

    let names: Vec<String> = target
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if names.len() != 1 {
        return Ok(names);
    }

    // A single token may be a service or a group; a name that is both is a
    // hard conflict the user has to resolve.
    let name = &names[0];
    if catalog.name_conflict(name)? {
        return Err(Error::NameConflict(name.clone()).into());
    }

    if catalog.get_service(name).is_ok() {
        return Ok(names);
    }

    match catalog.get_group(name) {
        Ok(members) => {
            out.status(&format!(
                "Running group '{}' ({} services)...",
                name,
                members.len()
            ));
            Ok(members)
        }
        Err(_) => bail!("Service or group '{}' not found", name),
    }
}
