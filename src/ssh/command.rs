//! Command execution over SSH
//!
//! Provides the [`CommandResult`] struct and `exec` for running one command
//! on an open [`Session`] and reading both output streams to completion.

use russh::ChannelMsg;
use tracing::debug;

use super::session::Session;
use crate::error::{GatewayError, Result};

/// Captured output of one remote command
///
/// Immutable once captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    stdout: String,
    stderr: String,
    exit_status: Option<u32>,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: None,
        }
    }

    pub fn with_exit_status(mut self, exit_status: u32) -> Self {
        self.exit_status = Some(exit_status);
        self
    }

    /// Standard output
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Standard error
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Exit status, when the server reported one
    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }
}

/// Raw stream buffers while a command is running
#[derive(Default)]
struct OutputCollector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
    eof: bool,
}

impl OutputCollector {
    /// Feed one channel message; returns true once the command is complete
    fn push(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => self.on_stdout(&data),
            // ext == 1 is stderr
            ChannelMsg::ExtendedData { data, ext } if ext == 1 => self.on_stderr(&data),
            ChannelMsg::ExtendedData { data, .. } => self.on_stdout(&data),
            ChannelMsg::ExitStatus { exit_status } => self.on_exit_status(exit_status),
            ChannelMsg::Eof => self.on_eof(),
            ChannelMsg::Close => true,
            _ => false,
        }
    }

    fn on_stdout(&mut self, data: &[u8]) -> bool {
        self.stdout.extend_from_slice(data);
        false
    }

    fn on_stderr(&mut self, data: &[u8]) -> bool {
        self.stderr.extend_from_slice(data);
        false
    }

    fn on_exit_status(&mut self, exit_status: u32) -> bool {
        self.exit_status = Some(exit_status);
        self.eof
    }

    fn on_eof(&mut self) -> bool {
        self.eof = true;
        self.exit_status.is_some()
    }

    fn finish(self) -> Result<CommandResult> {
        // Both streams are complete once EOF is seen; a missing exit status
        // alone is not an error
        if !self.eof && self.exit_status.is_none() {
            return Err(GatewayError::ChannelClosed);
        }

        let result = CommandResult::new(
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
        );
        Ok(match self.exit_status {
            Some(status) => result.with_exit_status(status),
            None => result,
        })
    }
}

impl Session {
    /// Execute a command on a new exec channel
    ///
    /// The command is sent verbatim. Returns once stdout and stderr have been
    /// read to completion.
    pub async fn exec(&self, command: &str) -> Result<CommandResult> {
        let mut channel = self.handle().channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut collector = OutputCollector::default();
        while let Some(msg) = channel.wait().await {
            if collector.push(msg) {
                break;
            }
        }

        let result = collector.finish()?;
        debug!(
            "Command completed on {}: exit_status={:?}, stdout_len={}, stderr_len={}",
            self.target(),
            result.exit_status(),
            result.stdout().len(),
            result.stderr().len()
        );
        Ok(result)
    }
}
