use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Invalid service name: {0}")]
    #[diagnostic(
        code(pf::name::invalid),
        help("Names may only contain letters, numbers, hyphens and underscores (max 50 chars)")
    )]
    InvalidName(String),

    #[error("Invalid command: {0}")]
    #[diagnostic(code(pf::command::invalid))]
    InvalidCommand(String),

    #[error("Service '{0}' not found")]
    #[diagnostic(
        code(pf::service::not_found),
        help("List registered services with `pf list` or add one with `pf add <name> <command>`")
    )]
    ServiceNotFound(String),

    #[error("Group '{0}' not found")]
    #[diagnostic(code(pf::group::not_found), help("List groups with `pf group list`"))]
    GroupNotFound(String),

    #[error("Name '{0}' exists as both a service and a group")]
    #[diagnostic(
        code(pf::name::conflict),
        help("Rename either the service or the group to resolve the conflict")
    )]
    NameConflict(String),

    #[error("Service '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Could not extract ports from command: {0}")]
    #[diagnostic(
        code(pf::ports::extract),
        help("The command must contain a `<local>:<remote>` port pair, e.g. `5432:5432`")
    )]
    PortExtraction(String),

    #[error("Port {port} is still in use after {attempts} cleanup attempts")]
    #[diagnostic(
        code(pf::ports::busy),
        help("Find what's holding the port with: lsof -i :{port} (macOS/Linux) or netstat -ano | findstr :{port} (Windows)")
    )]
    PortBusy { port: String, attempts: u32 },

    #[error("Certificate error: {0}")]
    #[diagnostic(code(pf::cert::error))]
    Certificate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound(name) => Some(format!(
                "Register it first with: pf add {} \"<command>\"",
                name
            )),
            Error::AlreadyRunning(name) => Some(format!(
                "Stop it from the UI (select '{}' and press 's') or restart it with 'r'.",
                name
            )),
            Error::PortBusy { port, .. } => Some(format!(
                "Kill the holder manually (kill -9 $(lsof -ti :{})) or run `pf cleanup` to sweep kubectl/ssh processes.",
                port
            )),
            Error::PortExtraction(_) => Some(
                "pf derives the local port from the first `<digits>:<digits>` pair in the command."
                    .to_string(),
            ),
            Error::NameConflict(name) => Some(format!(
                "Delete one of the two: `pf delete {}` or `pf group delete {}`.",
                name, name
            )),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_busy_suggestion_names_the_port() {
        let err = Error::PortBusy {
            port: "5432".to_string(),
            attempts: 3,
        };
        assert!(err.suggestion().unwrap().contains(":5432"));
        assert!(err.with_suggestion().contains("Hint:"));
    }

    #[test]
    fn plain_errors_have_no_suggestion() {
        assert!(Error::Config("bad".into()).suggestion().is_none());
    }
}
