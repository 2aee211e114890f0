//! Session establishment
//!
//! [`SessionEstablisher`] opens a fresh SSH connection for one
//! [`ConnectionRequest`], verifies the host identity through
//! [`GatewayHandler`], and authenticates with the resolved credential.
//! The resulting [`Session`] is owned by the call that opened it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg};
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use super::command::CommandResult;
use super::config::ConnectionRequest;
use super::credential::Credential;
use super::handler::{GatewayHandler, HostTrustPolicy};
use crate::error::{GatewayError, Result, Stage};

/// Default bound on connect plus authentication, in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// An authenticated remote shell able to run commands
#[async_trait]
pub trait RemoteSession: Send {
    /// Run one command verbatim and capture its output
    async fn run(&mut self, command: &str) -> Result<CommandResult>;

    /// Whether the underlying transport is gone
    fn is_closed(&self) -> bool;

    /// Disconnect; the session cannot be used afterwards
    async fn close(self: Box<Self>);
}

/// Opens authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        request: &ConnectionRequest,
    ) -> std::result::Result<Box<dyn RemoteSession>, EstablishError>;
}

/// Which half of establishment failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Authenticate,
}

impl Phase {
    pub fn stage(self, target: &str) -> Stage<'_> {
        match self {
            Phase::Connect => Stage::Connect { target },
            Phase::Authenticate => Stage::Authenticate { target },
        }
    }
}

/// Session establishment failure, tagged with the phase it happened in
#[derive(Debug, Error)]
#[error("{source}")]
pub struct EstablishError {
    pub phase: Phase,
    #[source]
    pub source: GatewayError,
}

impl EstablishError {
    pub fn connect(source: impl Into<GatewayError>) -> Self {
        Self {
            phase: Phase::Connect,
            source: source.into(),
        }
    }

    pub fn authenticate(source: impl Into<GatewayError>) -> Self {
        Self {
            phase: Phase::Authenticate,
            source: source.into(),
        }
    }
}

/// Opens SSH sessions with russh
#[derive(Debug, Clone)]
pub struct SessionEstablisher {
    policy: HostTrustPolicy,
    known_hosts: Option<PathBuf>,
    connect_timeout: Duration,
    ssh_config: Arc<client::Config>,
}

impl Default for SessionEstablisher {
    fn default() -> Self {
        Self::new(HostTrustPolicy::default())
    }
}

impl SessionEstablisher {
    pub fn new(policy: HostTrustPolicy) -> Self {
        Self {
            policy,
            known_hosts: None,
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            ssh_config: Arc::new(client::Config::default()),
        }
    }

    /// Use this known_hosts file instead of `~/.ssh/known_hosts`
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    /// Bound connect plus authentication
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn policy(&self) -> &HostTrustPolicy {
        &self.policy
    }

    async fn connect(
        &self,
        request: &ConnectionRequest,
        deadline: Instant,
    ) -> std::result::Result<Handle<GatewayHandler>, EstablishError> {
        info!(
            "Connecting to SSH server {}:{}...",
            request.host, request.port
        );

        let handler = GatewayHandler::new(
            request.host.clone(),
            request.port,
            self.policy.clone(),
            self.known_hosts.clone(),
        );

        match timeout_at(
            deadline,
            client::connect(
                self.ssh_config.clone(),
                (request.host.as_str(), request.port),
                handler,
            ),
        )
        .await
        {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(EstablishError::connect(e)),
            Err(_) => Err(EstablishError::connect(GatewayError::Timeout(
                self.connect_timeout,
            ))),
        }
    }

    async fn authenticate(
        handle: &mut Handle<GatewayHandler>,
        request: &ConnectionRequest,
    ) -> Result<()> {
        let username = request.username.as_str();
        debug!(
            "Attempting {} authentication for user '{}'",
            request.credential.method(),
            username
        );

        let result = match &request.credential {
            Credential::PrivateKeyPath(path) => {
                let key = load_secret_key(path, None).map_err(|source| GatewayError::KeyLoad {
                    path: path.clone(),
                    source,
                })?;
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
            }
            Credential::Password(password) => {
                handle
                    .authenticate_password(username, password.expose_secret().as_str())
                    .await?
            }
        };

        if result.success() {
            info!("{} authentication successful", request.credential.method());
            Ok(())
        } else {
            Err(GatewayError::AuthRejected {
                method: request.credential.method(),
                user: request.username.clone(),
            })
        }
    }
}

#[async_trait]
impl Connector for SessionEstablisher {
    async fn open(
        &self,
        request: &ConnectionRequest,
    ) -> std::result::Result<Box<dyn RemoteSession>, EstablishError> {
        let deadline = Instant::now() + self.connect_timeout;
        let mut handle = self.connect(request, deadline).await?;

        let authenticated = timeout_at(deadline, Self::authenticate(&mut handle, request)).await;
        let failure = match authenticated {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(GatewayError::Timeout(self.connect_timeout)),
        };
        if let Some(e) = failure {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            return Err(EstablishError::authenticate(e));
        }

        info!("Successfully connected to {}", request.target());
        Ok(Box::new(Session::new(handle, request.target())))
    }
}

/// An open, authenticated SSH session
pub struct Session {
    handle: Handle<GatewayHandler>,
    target: String,
}

impl Session {
    fn new(handle: Handle<GatewayHandler>, target: String) -> Self {
        Self { handle, target }
    }

    pub(crate) fn handle(&self) -> &Handle<GatewayHandler> {
        &self.handle
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl RemoteSession for Session {
    async fn run(&mut self, command: &str) -> Result<CommandResult> {
        self.exec(command).await
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn close(self: Box<Self>) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
        debug!("SSH session to {} closed", self.target);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use secrecy::SecretString;

    fn password_request(host: &str, port: u16) -> ConnectionRequest {
        ConnectionRequest::new(
            host,
            "testuser",
            Credential::Password(SecretString::new("testpass".to_string())),
        )
        .with_port(port)
    }

    #[test]
    fn test_phase_maps_to_stage() {
        assert_eq!(
            Phase::Connect.stage("u@h:22"),
            Stage::Connect { target: "u@h:22" }
        );
        assert_eq!(
            Phase::Authenticate.stage("u@h:22"),
            Stage::Authenticate { target: "u@h:22" }
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Bind then drop a listener so the port is very likely closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let establisher = SessionEstablisher::default()
            .with_connect_timeout(Duration::from_secs(5));
        let request = password_request("127.0.0.1", port);

        let err = match establisher.open(&request).await {
            Ok(_) => panic!("connection to a closed port should fail"),
            Err(e) => e,
        };
        assert_eq!(err.phase, Phase::Connect);

        let target = request.target();
        let report = classify(err.phase.stage(&target), &err.source);
        assert_eq!(report.kind, ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts TCP but never speaks SSH
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let establisher = SessionEstablisher::default()
            .with_connect_timeout(Duration::from_millis(200));
        let request = password_request("127.0.0.1", port);

        let err = match establisher.open(&request).await {
            Ok(_) => panic!("silent server should time out"),
            Err(e) => e,
        };
        assert_eq!(err.phase, Phase::Connect);
        assert!(matches!(err.source, GatewayError::Timeout(_)));
    }
}
