//! Global client certificate for kubectl forwards.
//!
//! One certificate applies to every kubectl service. The store keeps
//! `~/.pf/certificate.json` pointing at PEM artifacts extracted under
//! `~/.pf/certs/`. The P12 → PEM conversion itself is delegated to the
//! `openssl` tool; pf only orchestrates paths, permissions and the JSON
//! record.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

const CERT_FILE: &str = "certificate.json";
const CERT_DIR: &str = "certs";

/// The persisted certificate record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertConfig {
    pub p12_path: String,
    pub cert_path: String,
    pub key_path: String,
}

/// Handle to `~/.pf` and the certificate record inside it.
pub struct CertStore {
    config_dir: PathBuf,
}

impl CertStore {
    /// Open (creating if needed) the `~/.pf` directory with owner-only access.
    pub fn open() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Certificate("could not determine home directory".to_string()))?;
        Self::open_at(home.join(".pf"))
    }

    pub fn open_at(config_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&config_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { config_dir })
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join(CERT_FILE)
    }

    /// The configured certificate, or `None` when nothing is set up.
    pub fn get(&self) -> Result<Option<CertConfig>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let config: CertConfig = serde_json::from_str(&data)
            .map_err(|e| Error::Certificate(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    /// Extract `p12_path` into PEM cert+key under `~/.pf/certs/` and record
    /// the result. An existing certificate is overwritten.
    pub fn add(&self, p12_path: &Path, password: &str) -> Result<CertConfig> {
        if !p12_path.exists() {
            return Err(Error::Certificate(format!(
                "P12 file not found: {}",
                p12_path.display()
            )));
        }

        let cert_dir = self.config_dir.join(CERT_DIR);
        std::fs::create_dir_all(&cert_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&cert_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        let cert_path = cert_dir.join("client-cert.pem");
        let key_path = cert_dir.join("client-key.pem");

        extract_p12(p12_path, password, &cert_path, &key_path)?;

        let config = CertConfig {
            p12_path: p12_path.to_string_lossy().into_owned(),
            cert_path: cert_path.to_string_lossy().into_owned(),
            key_path: key_path.to_string_lossy().into_owned(),
        };
        self.save(&config)?;
        Ok(config)
    }

    /// Drop the configured certificate. Errors when none is set up.
    pub fn remove(&self) -> Result<()> {
        let path = self.config_path();
        if !path.exists() {
            return Err(Error::Certificate("no certificate configured".to_string()));
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }

    fn save(&self, config: &CertConfig) -> Result<()> {
        let path = self.config_path();
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// P12 → PEM via the `openssl pkcs12` tool (the format conversion is an
/// external concern; pf ships no PKCS#12 parser). Output files end up
/// owner-readable only.
fn extract_p12(p12: &Path, password: &str, cert_out: &Path, key_out: &Path) -> Result<()> {
    let passin = format!("pass:{}", password);

    let cert_status = Command::new("openssl")
        .arg("pkcs12")
        .arg("-in")
        .arg(p12)
        .args(["-clcerts", "-nokeys", "-passin", &passin, "-out"])
        .arg(cert_out)
        .output()
        .map_err(|e| Error::Certificate(format!("failed to run openssl: {}", e)))?;
    if !cert_status.status.success() {
        return Err(Error::Certificate(format!(
            "failed to extract certificate (check password): {}",
            String::from_utf8_lossy(&cert_status.stderr).trim()
        )));
    }

    let key_status = Command::new("openssl")
        .arg("pkcs12")
        .arg("-in")
        .arg(p12)
        .args(["-nocerts", "-nodes", "-passin", &passin, "-out"])
        .arg(key_out)
        .output()
        .map_err(|e| Error::Certificate(format!("failed to run openssl: {}", e)))?;
    if !key_status.status.success() {
        return Err(Error::Certificate(format!(
            "failed to extract private key (check password): {}",
            String::from_utf8_lossy(&key_status.stderr).trim()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for path in [cert_out, key_out] {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
    }

    Ok(())
}
