//! Service catalog: persistence of named port-forward commands and groups.
//!
//! The catalog lives in a `services.json` next to the executable:
//!
//! ```json
//! { "services": { "db": "kubectl port-forward svc/pg 5432:5432" },
//!   "groups":   { "backend": ["db", "redis"] } }
//! ```
//!
//! An older flat shape (`{ "db": "kubectl ..." }`) is accepted on read and
//! rewritten in the nested shape on the next save. A missing file reads as an
//! empty catalog. Service entries may carry health-check metadata, in which
//! case they serialize as objects instead of bare command strings.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

const CATALOG_FILE: &str = "services.json";

/// How a running service's local port should be probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    /// Probe TCP; upgrade to HTTP once the port answers HTTP.
    #[default]
    Auto,
    /// TCP connect only.
    Tcp,
    /// HTTP GET against `health_path`.
    Http,
}

/// A registered service: the command to run plus optional probe metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub command: String,
    #[serde(default, skip_serializing_if = "is_auto")]
    pub health_check: HealthCheckKind,
    /// Path for HTTP health checks. Defaults to `/` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn is_auto(kind: &HealthCheckKind) -> bool {
    *kind == HealthCheckKind::Auto
}

impl ServiceDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            health_check: HealthCheckKind::Auto,
            health_path: None,
            description: None,
        }
    }

    fn is_bare_command(&self) -> bool {
        self.health_check == HealthCheckKind::Auto
            && self.health_path.is_none()
            && self.description.is_none()
    }
}

/// On-disk service value: either a bare command string or a full definition.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDefinition {
    Command(String),
    Full(ServiceDefinition),
}

impl From<RawDefinition> for ServiceDefinition {
    fn from(raw: RawDefinition) -> Self {
        match raw {
            RawDefinition::Command(command) => ServiceDefinition::new(command),
            RawDefinition::Full(def) => def,
        }
    }
}

/// Nested on-disk shape. BTreeMaps keep the file diff-stable.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    services: BTreeMap<String, RawDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, Vec<String>>,
}

/// Parsed catalog contents.
#[derive(Debug, Default, Clone)]
pub struct CatalogData {
    pub services: BTreeMap<String, ServiceDefinition>,
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Handle to the catalog file.
pub struct Catalog {
    file_path: PathBuf,
}

impl Catalog {
    /// Catalog next to the executable (the shipping location).
    pub fn new() -> Self {
        Self {
            file_path: crate::config::exe_dir().join(CATALOG_FILE),
        }
    }

    /// Catalog at an explicit path (tests).
    pub fn at(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn load(&self) -> Result<CatalogData> {
        if !self.file_path.exists() {
            return Ok(CatalogData::default());
        }

        let data = std::fs::read_to_string(&self.file_path)?;
        let value: serde_json::Value = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", self.file_path.display(), e)))?;

        // The nested shape is recognized by its top-level keys; anything else
        // (including an empty object) is treated as the legacy flat map.
        let is_nested = value
            .as_object()
            .map(|o| o.contains_key("services") || o.contains_key("groups"))
            .unwrap_or(false);

        if is_nested {
            let raw: RawCatalog = serde_json::from_value(value)?;
            return Ok(CatalogData {
                services: raw
                    .services
                    .into_iter()
                    .map(|(name, def)| (name, def.into()))
                    .collect(),
                groups: raw.groups,
            });
        }

        let legacy: BTreeMap<String, String> = serde_json::from_value(value).map_err(|e| {
            Error::Config(format!(
                "failed to parse {}: {}",
                self.file_path.display(),
                e
            ))
        })?;

        Ok(CatalogData {
            services: legacy
                .into_iter()
                .map(|(name, command)| (name, ServiceDefinition::new(command)))
                .collect(),
            groups: BTreeMap::new(),
        })
    }

    pub fn save(&self, data: &CatalogData) -> Result<()> {
        let raw = RawCatalog {
            services: data
                .services
                .iter()
                .map(|(name, def)| {
                    let value = if def.is_bare_command() {
                        RawDefinition::Command(def.command.clone())
                    } else {
                        RawDefinition::Full(def.clone())
                    };
                    (name.clone(), value)
                })
                .collect(),
            groups: data.groups.clone(),
        };

        let json = serde_json::to_string_pretty(&raw)?;
        std::fs::write(&self.file_path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.file_path, std::fs::Permissions::from_mode(0o644))?;
        }

        Ok(())
    }

    pub fn add_service(&self, name: &str, command: &str) -> Result<()> {
        validate_service_name(name)?;
        validate_command(command)?;

        let mut data = self.load()?;
        data.services
            .insert(name.to_string(), ServiceDefinition::new(command));
        self.save(&data)
    }

    pub fn delete_service(&self, name: &str) -> Result<()> {
        let mut data = self.load()?;
        if data.services.remove(name).is_none() {
            return Err(Error::ServiceNotFound(name.to_string()));
        }
        self.save(&data)
    }

    pub fn get_service(&self, name: &str) -> Result<ServiceDefinition> {
        self.load()?
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// All services sorted by name.
    pub fn list_services(&self) -> Result<Vec<(String, ServiceDefinition)>> {
        Ok(self.load()?.services.into_iter().collect())
    }

    pub fn all_service_names(&self) -> Result<Vec<String>> {
        Ok(self.load()?.services.into_keys().collect())
    }

    pub fn add_group(&self, name: &str, members: &[String]) -> Result<()> {
        validate_service_name(name)?;

        let mut data = self.load()?;
        if data.services.contains_key(name) {
            return Err(Error::Config(format!(
                "a service with name '{}' already exists, cannot create group with same name",
                name
            )));
        }
        for member in members {
            if !data.services.contains_key(member) {
                return Err(Error::ServiceNotFound(member.clone()));
            }
        }

        data.groups.insert(name.to_string(), members.to_vec());
        self.save(&data)
    }

    pub fn delete_group(&self, name: &str) -> Result<()> {
        let mut data = self.load()?;
        if data.groups.remove(name).is_none() {
            return Err(Error::GroupNotFound(name.to_string()));
        }
        self.save(&data)
    }

    pub fn get_group(&self, name: &str) -> Result<Vec<String>> {
        self.load()?
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }

    /// All groups sorted by name.
    pub fn list_groups(&self) -> Result<Vec<(String, Vec<String>)>> {
        Ok(self.load()?.groups.into_iter().collect())
    }

    /// True when `name` exists as both a service and a group.
    pub fn name_conflict(&self, name: &str) -> Result<bool> {
        let data = self.load()?;
        Ok(data.services.contains_key(name) && data.groups.contains_key(name))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `(local, remote)` port pair from a command: the first
/// `<digits>:<digits>` occurrence. Ports are kept as strings since they are
/// only ever spliced back into commands and socket addresses.
pub fn extract_ports(command: &str) -> Option<(String, String)> {
    static PORT_RE: OnceLock<Regex> = OnceLock::new();
    let re = PORT_RE.get_or_init(|| Regex::new(r"(\d+):(\d+)").expect("valid regex"));

    re.captures(command)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Service names are path-safe identifiers: 1-50 chars of `[A-Za-z0-9_-]`.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("name cannot be empty".to_string()));
    }
    if name.len() > 50 {
        return Err(Error::InvalidName(
            "name too long (max 50 characters)".to_string(),
        ));
    }

    const FORBIDDEN: &[&str] = &["..", "/", "\\", ":", "*", "?", "\"", "<", ">", "|"];
    for ch in FORBIDDEN {
        if name.contains(ch) {
            return Err(Error::InvalidName(format!(
                "name contains invalid character: {}",
                ch
            )));
        }
    }

    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex"));
    if !re.is_match(name) {
        return Err(Error::InvalidName(
            "name can only contain letters, numbers, hyphens, and underscores".to_string(),
        ));
    }

    Ok(())
}

/// Reject empty, oversized, or obviously destructive commands before anything
/// is persisted or spawned.
pub fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(Error::InvalidCommand("command cannot be empty".to_string()));
    }
    if command.len() > 1000 {
        return Err(Error::InvalidCommand(
            "command too long (max 1000 characters)".to_string(),
        ));
    }

    static DANGEROUS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = DANGEROUS.get_or_init(|| {
        [
            r"rm\s+-rf",
            r"dd\s+if=",
            r"mkfs",
            r"format",
            r"del\s+/f",
            r"shutdown",
            r"reboot",
            r"halt",
            r"poweroff",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    });

    let lowered = command.to_lowercase();
    for pattern in patterns {
        if pattern.is_match(&lowered) {
            return Err(Error::InvalidCommand(format!(
                "command contains potentially dangerous operation: {}",
                pattern.as_str()
            )));
        }
    }

    Ok(())
}
