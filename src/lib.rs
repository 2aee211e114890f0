//! Linux VM Admin - A Model Context Protocol server for administering Linux hosts over SSH
//!
//! Every tool call carries its own connection details (host, username, and a
//! password or private key path). The server resolves the credential, opens
//! an authenticated SSH session, runs a single command and returns its
//! output as text.
//!
//! # Features
//!
//! - Password or private key authentication, chosen per call
//! - Host identity verification against known_hosts (strict, trust-on-first-use
//!   or a caller-supplied approver)
//! - Connect and command deadlines
//! - Optional pooling of authenticated sessions
//! - Structured failures: every error carries an [`ErrorKind`]
//!
//! # MCP Tools
//!
//! - `execute_linux_command` - Run a shell command
//! - `read_file_content` - Read a file
//! - `get_disk_usage` - Disk usage report
//! - `list_directory_contents` - Directory listing
//! - `get_system_info` - Kernel and OS release
//!
//! The `dynamic_linux_chat_prompt` prompt frames a natural-language request
//! about a host for an assistant that has these tools.
//!
//! # Example Usage (library)
//!
//! ```no_run
//! use linux_vm_admin::{ConnectionParams, Gateway, SessionEstablisher};
//!
//! # async fn demo() {
//! let gateway = Gateway::new(SessionEstablisher::default());
//! let params = ConnectionParams::new("192.168.1.100", "admin").with_password("secret");
//! match gateway.disk_usage(&params).await {
//!     Ok(output) => println!("{}", output),
//!     Err(report) => eprintln!("{}: {}", report.kind, report.message),
//! }
//! # }
//! ```
//!
//! # Example Usage (MCP Inspector)
//!
//! ```bash
//! npx @modelcontextprotocol/inspector ./target/release/linux-vm-admin -- --host-trust=tofu
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod server;
pub mod ssh;
pub mod tools;

// Re-exports for convenience
pub use config::{Args, Config};
pub use error::{classify, ErrorKind, ErrorReport, GatewayError, Result};
pub use gateway::{Gateway, SessionPolicy};
pub use prompt::{build_conversation, ChatMessage, Role};
pub use server::AdminServer;
pub use ssh::{
    format_output, resolve, CommandResult, ConnectionParams, Credential, HostKeyApprover,
    HostKeyStatus, HostTrustPolicy, SessionEstablisher,
};
