//! Error types for the Linux VM admin gateway
//!
//! [`GatewayError`] is the internal cause type produced by every stage of the
//! pipeline. [`classify`] maps a cause, together with the stage it surfaced
//! at, into the caller-facing [`ErrorReport`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Internal failure cause
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No password and no usable private key file
    #[error("neither credential supplied or key file missing")]
    MissingCredential,

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Private key file could not be read or parsed
    #[error("failed to load private key from {}: {source}", path.display())]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    /// Server refused the offered credential
    #[error("{method} authentication rejected for user '{user}'")]
    AuthRejected { method: &'static str, user: String },

    /// Host key approver returned an error
    #[error("host key approver failed: {0:#}")]
    Approver(anyhow::Error),

    /// Channel ended before the command reported EOF or an exit status
    #[error("channel closed before the command completed")]
    ChannelClosed,

    /// A deadline expired
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// SSH transport or protocol error
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Caller-facing failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ConfigurationError,
    AuthenticationFailure,
    TransportError,
    ExecutionError,
    TimeoutError,
    UnknownError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::AuthenticationFailure => "AuthenticationFailure",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::UnknownError => "UnknownError",
        };
        f.write_str(name)
    }
}

/// A classified failure: the kind callers can branch on, and the text they display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Pipeline stage a failure surfaced at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage<'a> {
    /// Credential resolution, before any network activity
    Resolve,
    /// TCP connect, key exchange and host key verification
    Connect { target: &'a str },
    /// User authentication on an established transport
    Authenticate { target: &'a str },
    /// Running the command on an authenticated session
    Execute { command: &'a str },
}

/// Map a failure cause into an [`ErrorReport`]
///
/// Pure function: the same stage and cause always yield the same report.
pub fn classify(stage: Stage<'_>, cause: &GatewayError) -> ErrorReport {
    use ErrorKind::*;

    let kind = match (stage, cause) {
        (_, GatewayError::MissingCredential | GatewayError::InvalidParams(_)) => {
            ConfigurationError
        }
        (_, GatewayError::Timeout(_)) => TimeoutError,
        (_, GatewayError::Approver(_)) => UnknownError,
        (Stage::Execute { .. }, _) => ExecutionError,
        (_, GatewayError::KeyLoad { .. } | GatewayError::AuthRejected { .. }) => {
            AuthenticationFailure
        }
        (_, GatewayError::Ssh(russh::Error::NotAuthenticated)) => AuthenticationFailure,
        (
            Stage::Connect { .. } | Stage::Authenticate { .. },
            GatewayError::Ssh(_) | GatewayError::Io(_) | GatewayError::ChannelClosed,
        ) => TransportError,
        (Stage::Resolve, _) => UnknownError,
    };

    let message = match (kind, stage) {
        (ConfigurationError, _) => format!("Configuration error: {}", cause),
        (AuthenticationFailure, Stage::Connect { target } | Stage::Authenticate { target }) => {
            format!("Authentication failed for {}: {}", target, cause)
        }
        (TransportError, Stage::Connect { target } | Stage::Authenticate { target }) => {
            if matches!(cause, GatewayError::Ssh(russh::Error::UnknownKey)) {
                format!(
                    "SSH connection error to {}: host identity is not trusted (add it to known_hosts, or run with --host-trust tofu to accept unknown hosts on first use)",
                    target
                )
            } else {
                format!("SSH connection error to {}: {}", target, cause)
            }
        }
        (ExecutionError, Stage::Execute { command }) => {
            format!("Error executing command '{}': {}", command, cause)
        }
        (TimeoutError, Stage::Execute { command }) => {
            format!("Command '{}' {}", command, cause)
        }
        (TimeoutError, Stage::Connect { target } | Stage::Authenticate { target }) => {
            format!("Connection to {} {}", target, cause)
        }
        _ => format!("An unexpected error occurred: {}", cause),
    };

    ErrorReport::new(kind, message)
}
