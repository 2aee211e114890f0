//! Configuration and CLI argument parsing for the Linux VM admin server
//!
//! Connection details arrive with every tool call; these settings cover what
//! the server decides once at startup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{GatewayError, Result};
use crate::gateway::SessionPolicy;
use crate::ssh::{HostTrustPolicy, CONNECTION_TIMEOUT_SECS, DEFAULT_SSH_PORT};

/// Default timeout for command execution in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000; // 60 seconds

/// Default max characters for a command (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = None;

/// Default idle lifetime of pooled sessions in seconds
pub const DEFAULT_POOL_IDLE_SECS: u64 = 60;

/// Treatment of hosts missing from known_hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HostTrust {
    /// Refuse hosts that are not already in known_hosts
    Strict,
    /// Accept unknown hosts and record them in known_hosts
    Tofu,
}

/// Linux VM admin server CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "linux-vm-admin")]
#[command(version)]
#[command(about = "MCP server running administration commands on Linux hosts over SSH")]
pub struct Args {
    /// SSH port used when a call does not specify one
    #[arg(long, default_value = "22", env = "SSH_ADMIN_PORT")]
    pub default_port: u16,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long, env = "SSH_ADMIN_KNOWN_HOSTS")]
    pub known_hosts: Option<PathBuf>,

    /// Host identity policy: strict refuses hosts missing from known_hosts,
    /// tofu accepts and records them on first connection
    #[arg(long, value_enum, default_value = "strict", env = "SSH_ADMIN_HOST_TRUST")]
    pub host_trust: HostTrust,

    /// Connect and authentication timeout in seconds
    #[arg(long, default_value = "30", env = "SSH_ADMIN_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Command execution timeout in milliseconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, env = "SSH_ADMIN_TIMEOUT")]
    pub timeout: u64,

    /// Maximum characters for command length.
    /// Use "none", "0", or negative value to disable limit.
    /// Default: unlimited
    #[arg(long = "maxChars", env = "SSH_ADMIN_MAX_CHARS")]
    pub max_chars: Option<String>,

    /// Idle sessions kept for reuse (0 = new session for every call)
    #[arg(long, default_value = "0", env = "SSH_ADMIN_POOL_SIZE")]
    pub pool_size: usize,

    /// Seconds an idle pooled session may be reused
    #[arg(long, default_value_t = DEFAULT_POOL_IDLE_SECS, env = "SSH_ADMIN_POOL_IDLE_SECS")]
    pub pool_idle_secs: u64,
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for calls that do not name one
    pub default_port: u16,

    /// known_hosts override
    pub known_hosts: Option<PathBuf>,

    /// Host identity policy
    pub host_trust: HostTrust,

    /// Connect plus authentication bound
    pub connect_timeout: Duration,

    /// Command bound (None = wait indefinitely)
    pub command_timeout: Option<Duration>,

    /// Maximum command length (None = unlimited)
    pub max_chars: Option<usize>,

    /// Single-use or pooled sessions
    pub session_policy: SessionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_SSH_PORT,
            known_hosts: None,
            host_trust: HostTrust::Strict,
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            command_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            max_chars: DEFAULT_MAX_CHARS,
            session_policy: SessionPolicy::SingleUse,
        }
    }
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> std::result::Result<Self, ConfigError> {
        validate_args(&args)?;

        let session_policy = if args.pool_size == 0 {
            SessionPolicy::SingleUse
        } else {
            SessionPolicy::Pooled {
                capacity: args.pool_size,
                idle_timeout: Duration::from_secs(args.pool_idle_secs),
            }
        };

        Ok(Config {
            default_port: args.default_port,
            known_hosts: args.known_hosts,
            host_trust: args.host_trust,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            command_timeout: (args.timeout > 0).then(|| Duration::from_millis(args.timeout)),
            max_chars: parse_max_chars(args.max_chars.as_deref()),
            session_policy,
        })
    }

    /// Host trust strategy for the session establisher
    pub fn host_trust_policy(&self) -> HostTrustPolicy {
        match self.host_trust {
            HostTrust::Strict => HostTrustPolicy::Strict,
            HostTrust::Tofu => HostTrustPolicy::TrustOnFirstUse,
        }
    }
}

/// Startup configuration problems, reported all at once
#[derive(Debug, thiserror::Error)]
#[error("Configuration error:\n{}", .0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

/// Validate CLI arguments
fn validate_args(args: &Args) -> std::result::Result<(), ConfigError> {
    let mut errors = Vec::new();

    if args.default_port == 0 {
        errors.push("--default-port must be non-zero".to_string());
    }

    if args.connect_timeout == 0 {
        errors.push("--connect-timeout must be at least 1 second".to_string());
    }

    if args.pool_size > 0 && args.pool_idle_secs == 0 {
        errors.push("--pool-idle-secs must be non-zero when pooling".to_string());
    }

    if let Some(ref path) = args.known_hosts {
        if path.is_dir() {
            errors.push(format!(
                "known_hosts path is a directory: {}",
                path.display()
            ));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError(errors));
    }

    Ok(())
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) or unparsable → DEFAULT_MAX_CHARS
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    match value {
        None => DEFAULT_MAX_CHARS,
        Some(s) => {
            if s.eq_ignore_ascii_case("none") {
                return None;
            }

            match s.parse::<i64>() {
                Ok(n) if n <= 0 => None,
                Ok(n) => Some(n as usize),
                Err(_) => DEFAULT_MAX_CHARS,
            }
        }
    }
}

/// Reject a command that is empty or longer than `max_chars`
///
/// The command itself is never altered; whitespace-only commands are sent as-is.
pub fn check_command_length(command: &str, max_chars: Option<usize>) -> Result<()> {
    if command.is_empty() {
        return Err(GatewayError::InvalidParams(
            "Command cannot be empty".to_string(),
        ));
    }

    if let Some(max) = max_chars {
        let length = command.chars().count();
        if length > max {
            return Err(GatewayError::InvalidParams(format!(
                "Command is too long (max {} characters, got {})",
                max, length
            )));
        }
    }

    Ok(())
}
