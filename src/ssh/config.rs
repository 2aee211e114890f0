//! Per-call connection types
//!
//! [`ConnectionParams`] is what a caller sends with every tool call;
//! [`ConnectionRequest`] is the validated form, holding a resolved credential.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::credential::Credential;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection details supplied with each call
#[derive(Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ConnectionParams {
    /// Hostname or IP address of the Linux machine
    pub host: String,

    /// SSH username
    pub username: String,

    /// SSH password (used when no usable private key is given)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Path to a private key file on the gateway host; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,

    /// SSH port (defaults to the server's configured port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("private_key_path", &self.private_key_path)
            .field("port", &self.port)
            .finish()
    }
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key_path(mut self, path: impl Into<String>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// A single connection attempt with its resolved credential
///
/// Created per call and never persisted.
#[derive(Debug)]
pub struct ConnectionRequest {
    /// Remote hostname or IP address
    pub host: String,

    /// SSH port
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Resolved credential
    pub credential: Credential,
}

impl ConnectionRequest {
    pub fn new(host: impl Into<String>, username: impl Into<String>, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            credential,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host:port`, for logs and error messages
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_connection_request_builder() {
        let request = ConnectionRequest::new(
            "192.168.1.1",
            "admin",
            Credential::Password(SecretString::new("secret".to_string())),
        )
        .with_port(2222);

        assert_eq!(request.host, "192.168.1.1");
        assert_eq!(request.port, 2222);
        assert_eq!(request.username, "admin");
        assert_eq!(request.target(), "admin@192.168.1.1:2222");
    }

    #[test]
    fn test_params_deserialize_optional_fields() {
        let json = r#"{"host": "vm1", "username": "root", "password": "pw"}"#;
        let params: ConnectionParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.host, "vm1");
        assert_eq!(params.password.as_deref(), Some("pw"));
        assert!(params.private_key_path.is_none());
        assert!(params.port.is_none());
    }

    #[test]
    fn test_params_debug_redacts_password() {
        let params = ConnectionParams::new("vm1", "root").with_password("hunter2");
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_params_require_host() {
        let json = r#"{"username": "root"}"#;
        assert!(serde_json::from_str::<ConnectionParams>(json).is_err());
    }
}
