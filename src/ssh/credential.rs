//! Credential resolution
//!
//! Turns the optional password and private key path supplied with a call into
//! exactly one [`Credential`]. A key path only wins when the file it points at
//! exists; otherwise the password is used.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, Result};

/// The authentication mechanism used for one connection
#[derive(Debug)]
pub enum Credential {
    /// Password authentication
    Password(SecretString),

    /// Public key authentication with the key stored at this (home-expanded) path
    PrivateKeyPath(PathBuf),
}

impl Credential {
    /// Human-readable method name for logs and error messages
    pub fn method(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::PrivateKeyPath(_) => "public key",
        }
    }

    /// Stable SHA-256 fingerprint, used to key pooled sessions without
    /// holding the secret itself
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Credential::Password(password) => {
                hasher.update(b"password\0");
                hasher.update(password.expose_secret().as_bytes());
            }
            Credential::PrivateKeyPath(path) => {
                hasher.update(b"key\0");
                hasher.update(path.to_string_lossy().as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Resolve the caller-supplied credential
///
/// - key path non-empty and the file exists → [`Credential::PrivateKeyPath`]
/// - else password non-empty → [`Credential::Password`]
/// - else [`GatewayError::MissingCredential`]
///
/// Performs no network activity.
pub fn resolve(password: Option<&str>, key_path: Option<&str>) -> Result<Credential> {
    if let Some(raw) = key_path.filter(|p| !p.is_empty()) {
        let path = expand_home(raw);
        if path.is_file() {
            return Ok(Credential::PrivateKeyPath(path));
        }
        tracing::debug!(
            "Private key {} not found, falling back to password",
            path.display()
        );
    }

    match password.filter(|p| !p.is_empty()) {
        Some(password) => Ok(Credential::Password(SecretString::new(password.to_string()))),
        None => Err(GatewayError::MissingCredential),
    }
}

/// Expand a leading `~` to the current user's home directory
///
/// Only `~` and `~/...` are expanded. Other users' homes (`~user/...`) are not
/// looked up; such paths are returned unchanged and will usually not exist.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(path).to_path_buf(),
    }
}
