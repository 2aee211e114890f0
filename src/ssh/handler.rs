//! SSH client handler and host trust policy
//!
//! Implements the `russh::client::Handler` trait. The server's host key is
//! looked up in an OpenSSH `known_hosts` file and the configured
//! [`HostTrustPolicy`] decides what to do with keys that are not there.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::HashAlg;
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Outcome of looking a host key up in the trusted host store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// The key matches a stored entry
    Known,
    /// No entry exists for this host
    Unknown,
    /// An entry exists but holds a different key
    Changed,
}

/// Caller-supplied decision for host keys the store cannot vouch for
pub trait HostKeyApprover: Send + Sync {
    /// Return `Ok(true)` to trust `fingerprint` for `host:port`
    fn approve(
        &self,
        host: &str,
        port: u16,
        fingerprint: &str,
        status: HostKeyStatus,
    ) -> anyhow::Result<bool>;
}

impl<F> HostKeyApprover for F
where
    F: Fn(&str, u16, &str, HostKeyStatus) -> anyhow::Result<bool> + Send + Sync,
{
    fn approve(
        &self,
        host: &str,
        port: u16,
        fingerprint: &str,
        status: HostKeyStatus,
    ) -> anyhow::Result<bool> {
        self(host, port, fingerprint, status)
    }
}

/// How hosts missing from the trusted store are treated
#[derive(Clone, Default)]
pub enum HostTrustPolicy {
    /// Only hosts already in known_hosts are accepted
    #[default]
    Strict,
    /// Unknown hosts are accepted and recorded; changed keys are still rejected
    TrustOnFirstUse,
    /// Unknown and changed keys are referred to the approver
    Delegate(Arc<dyn HostKeyApprover>),
}

impl fmt::Debug for HostTrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostTrustPolicy::Strict => f.write_str("Strict"),
            HostTrustPolicy::TrustOnFirstUse => f.write_str("TrustOnFirstUse"),
            HostTrustPolicy::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

/// What the handler does with a presented host key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Accept and append the key to the trusted store
    Learn,
    Reject,
}

impl HostTrustPolicy {
    /// Decide on a host key given its lookup status
    pub fn decide(
        &self,
        host: &str,
        port: u16,
        fingerprint: &str,
        status: HostKeyStatus,
    ) -> Result<Verdict, GatewayError> {
        match (self, status) {
            (_, HostKeyStatus::Known) => Ok(Verdict::Accept),
            (HostTrustPolicy::Strict, _) => Ok(Verdict::Reject),
            (HostTrustPolicy::TrustOnFirstUse, HostKeyStatus::Unknown) => Ok(Verdict::Learn),
            (HostTrustPolicy::TrustOnFirstUse, HostKeyStatus::Changed) => Ok(Verdict::Reject),
            (HostTrustPolicy::Delegate(approver), status) => {
                let approved = approver
                    .approve(host, port, fingerprint, status)
                    .map_err(GatewayError::Approver)?;
                Ok(match (approved, status) {
                    (false, _) => Verdict::Reject,
                    (true, HostKeyStatus::Unknown) => Verdict::Learn,
                    (true, _) => Verdict::Accept,
                })
            }
        }
    }
}

/// SSH client handler for russh, bound to one target host
#[derive(Debug, Clone)]
pub struct GatewayHandler {
    host: String,
    port: u16,
    policy: HostTrustPolicy,
    known_hosts: Option<PathBuf>,
}

impl GatewayHandler {
    /// Create a handler; `known_hosts` of `None` means `~/.ssh/known_hosts`
    pub fn new(
        host: impl Into<String>,
        port: u16,
        policy: HostTrustPolicy,
        known_hosts: Option<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            known_hosts,
        }
    }

    fn lookup(&self, key: &russh::keys::PublicKey) -> HostKeyStatus {
        let result = match &self.known_hosts {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        };

        match result {
            Ok(true) => HostKeyStatus::Known,
            Ok(false) => HostKeyStatus::Unknown,
            Err(russh::keys::Error::KeyChanged { line }) => {
                warn!(
                    "Host key for {}:{} differs from known_hosts line {}",
                    self.host, self.port, line
                );
                HostKeyStatus::Changed
            }
            Err(e) => {
                debug!("known_hosts lookup failed, treating host as unknown: {}", e);
                HostKeyStatus::Unknown
            }
        }
    }

    fn learn(&self, key: &russh::keys::PublicKey) {
        let result = match &self.known_hosts {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = result {
            warn!("Failed to save host key to known_hosts: {}", e);
        }
    }
}

impl russh::client::Handler for GatewayHandler {
    type Error = GatewayError;

    /// Verify the server's host key against known_hosts and the trust policy
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let status = self.lookup(server_public_key);
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        match self
            .policy
            .decide(&self.host, self.port, &fingerprint, status)?
        {
            Verdict::Accept => Ok(true),
            Verdict::Learn => {
                warn!(
                    "Trust-On-First-Use: accepting unknown host key {} for {}:{}",
                    fingerprint, self.host, self.port
                );
                self.learn(server_public_key);
                Ok(true)
            }
            Verdict::Reject => {
                warn!(
                    "Rejecting {:?} host key {} for {}:{}",
                    status, fingerprint, self.host, self.port
                );
                Ok(false)
            }
        }
    }
}
