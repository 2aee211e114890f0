//! SSH session handling
//!
//! Credential resolution, host identity verification, session establishment,
//! command execution and output formatting. Every call opens its own session
//! unless a [`SessionPool`] is in use.

pub mod command;
pub mod config;
pub mod credential;
pub mod handler;
pub mod output;
pub mod pool;
pub mod session;

// Re-exports
pub use command::CommandResult;
pub use config::{ConnectionParams, ConnectionRequest, DEFAULT_SSH_PORT};
pub use credential::{expand_home, resolve, Credential};
pub use handler::{GatewayHandler, HostKeyApprover, HostKeyStatus, HostTrustPolicy};
pub use output::format_output;
pub use pool::{PoolKey, SessionPool};
pub use session::{
    Connector, EstablishError, Phase, RemoteSession, Session, SessionEstablisher,
    CONNECTION_TIMEOUT_SECS,
};
