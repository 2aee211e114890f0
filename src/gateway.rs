//! Per-call execution pipeline
//!
//! [`Gateway`] composes credential resolution, session establishment, command
//! execution and output formatting for every call, classifying any failure
//! into an [`ErrorReport`]. The derived operations (`read_file`,
//! `disk_usage`, `list_directory`, `system_info`) are `execute` with a fixed
//! command template.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::check_command_length;
use crate::error::{classify, ErrorReport, GatewayError, Stage};
use crate::ssh::{
    format_output, resolve, ConnectionParams, ConnectionRequest, Connector, EstablishError,
    PoolKey, RemoteSession, SessionEstablisher, SessionPool, DEFAULT_SSH_PORT,
};

/// Command used by [`Gateway::disk_usage`]
pub const DISK_USAGE_COMMAND: &str = "df -h";

/// Command used by [`Gateway::system_info`]
pub const SYSTEM_INFO_COMMAND: &str = "uname -a && cat /etc/os-release";

/// Directory listed by [`Gateway::list_directory`] when no path is given
pub const DEFAULT_LIST_PATH: &str = ".";

/// Command used by [`Gateway::read_file`]
pub fn read_file_command(path: &str) -> String {
    format!("cat {}", path)
}

/// Command used by [`Gateway::list_directory`]
pub fn list_directory_command(path: Option<&str>) -> String {
    format!("ls -l {}", path.unwrap_or(DEFAULT_LIST_PATH))
}

/// Whether sessions outlive the call that opened them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Fresh connection and authentication per call, closed afterwards
    #[default]
    SingleUse,
    /// Successful sessions are kept idle for reuse by identical requests
    Pooled {
        capacity: usize,
        idle_timeout: Duration,
    },
}

/// Runs commands on remote hosts, one pipeline per call
pub struct Gateway<C = SessionEstablisher> {
    connector: C,
    pool: Option<SessionPool>,
    default_port: u16,
    command_timeout: Option<Duration>,
    max_chars: Option<usize>,
}

impl<C: Connector> Gateway<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pool: None,
            default_port: DEFAULT_SSH_PORT,
            command_timeout: None,
            max_chars: None,
        }
    }

    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self {
        self.pool = match policy {
            SessionPolicy::SingleUse => None,
            SessionPolicy::Pooled {
                capacity,
                idle_timeout,
            } => Some(SessionPool::new(capacity, idle_timeout)),
        };
        self
    }

    /// Port used when a call does not name one
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Bound on reading a command's output; `None` waits indefinitely
    pub fn with_command_timeout(mut self, command_timeout: Option<Duration>) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Longest command accepted; `None` means unlimited
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `command` verbatim on the host described by `params`
    pub async fn execute(
        &self,
        command: &str,
        params: &ConnectionParams,
    ) -> Result<String, ErrorReport> {
        check_command_length(command, self.max_chars)
            .map_err(|e| self.report(Stage::Resolve, &e))?;

        let credential = resolve(params.password.as_deref(), params.private_key_path.as_deref())
            .map_err(|e| self.report(Stage::Resolve, &e))?;

        let request = ConnectionRequest::new(&params.host, &params.username, credential)
            .with_port(params.port.unwrap_or(self.default_port));
        let target = request.target();

        let mut session = self
            .acquire(&request)
            .await
            .map_err(|e| self.report(e.phase.stage(&target), &e.source))?;

        debug!("Executing on {}: {}", target, command);
        let outcome = match self.command_timeout {
            Some(limit) => timeout(limit, session.run(command))
                .await
                .unwrap_or_else(|_| Err(GatewayError::Timeout(limit))),
            None => session.run(command).await,
        };

        match outcome {
            Ok(result) => {
                self.release(&request, session).await;
                info!("Command completed on {}", target);
                Ok(format_output(&result))
            }
            Err(e) => {
                session.close().await;
                Err(self.report(Stage::Execute { command }, &e))
            }
        }
    }

    /// `cat <path>`
    pub async fn read_file(
        &self,
        path: &str,
        params: &ConnectionParams,
    ) -> Result<String, ErrorReport> {
        self.execute(&read_file_command(path), params).await
    }

    /// `df -h`
    pub async fn disk_usage(&self, params: &ConnectionParams) -> Result<String, ErrorReport> {
        self.execute(DISK_USAGE_COMMAND, params).await
    }

    /// `ls -l <path>`, defaulting to the login directory
    pub async fn list_directory(
        &self,
        path: Option<&str>,
        params: &ConnectionParams,
    ) -> Result<String, ErrorReport> {
        self.execute(&list_directory_command(path), params).await
    }

    /// `uname -a && cat /etc/os-release`
    pub async fn system_info(&self, params: &ConnectionParams) -> Result<String, ErrorReport> {
        self.execute(SYSTEM_INFO_COMMAND, params).await
    }

    /// Close pooled sessions
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.drain().await;
        }
    }

    async fn acquire(
        &self,
        request: &ConnectionRequest,
    ) -> Result<Box<dyn RemoteSession>, EstablishError> {
        if let Some(pool) = &self.pool {
            if let Some(session) = pool.checkout(&PoolKey::for_request(request)).await {
                return Ok(session);
            }
        }
        self.connector.open(request).await
    }

    async fn release(&self, request: &ConnectionRequest, session: Box<dyn RemoteSession>) {
        match &self.pool {
            Some(pool) => pool.checkin(PoolKey::for_request(request), session).await,
            None => session.close().await,
        }
    }

    fn report(&self, stage: Stage<'_>, cause: &GatewayError) -> ErrorReport {
        let report = classify(stage, cause);
        warn!("{}: {}", report.kind, report.message);
        report
    }
}

impl<C> std::fmt::Debug for Gateway<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("pool", &self.pool)
            .field("default_port", &self.default_port)
            .field("command_timeout", &self.command_timeout)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Result};
    use crate::ssh::CommandResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts connections and records every command it is asked to run
    #[derive(Clone, Default)]
    struct Recorder {
        connections: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        commands: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn connections(&self) -> usize {
            self.connections.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    enum Script {
        Output(&'static str, &'static str),
        RejectAuth,
        Refuse,
        DropChannel,
        Hang,
    }

    struct FakeConnector {
        recorder: Recorder,
        script: Script,
    }

    struct FakeSession {
        recorder: Recorder,
        output: Option<(&'static str, &'static str)>,
        hang: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn open(
            &self,
            request: &ConnectionRequest,
        ) -> std::result::Result<Box<dyn RemoteSession>, EstablishError> {
            self.recorder.connections.fetch_add(1, Ordering::SeqCst);
            let (output, hang) = match self.script {
                Script::RejectAuth => {
                    return Err(EstablishError::authenticate(GatewayError::AuthRejected {
                        method: request.credential.method(),
                        user: request.username.clone(),
                    }))
                }
                Script::Refuse => {
                    return Err(EstablishError::connect(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    )))
                }
                Script::Output(stdout, stderr) => (Some((stdout, stderr)), false),
                Script::DropChannel => (None, false),
                Script::Hang => (None, true),
            };
            Ok(Box::new(FakeSession {
                recorder: self.recorder.clone(),
                output,
                hang,
            }))
        }
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn run(&mut self, command: &str) -> Result<CommandResult> {
            self.recorder.commands.lock().unwrap().push(command.to_string());
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.output {
                Some((stdout, stderr)) => Ok(CommandResult::new(stdout, stderr)),
                None => Err(GatewayError::ChannelClosed),
            }
        }

        fn is_closed(&self) -> bool {
            false
        }

        async fn close(self: Box<Self>) {
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gateway(script: Script) -> (Gateway<FakeConnector>, Recorder) {
        let recorder = Recorder::default();
        let connector = FakeConnector {
            recorder: recorder.clone(),
            script,
        };
        (Gateway::new(connector), recorder)
    }

    fn params() -> ConnectionParams {
        ConnectionParams::new("192.168.1.100", "admin").with_password("secret")
    }

    #[tokio::test]
    async fn test_execute_returns_trimmed_stdout() {
        let (gateway, recorder) = gateway(Script::Output("  hello\n", ""));
        let output = gateway.execute("echo hello", &params()).await.unwrap();

        assert_eq!(output, "hello");
        assert_eq!(recorder.commands(), vec!["echo hello"]);
    }

    #[tokio::test]
    async fn test_execute_reports_stderr_as_advisory() {
        let (gateway, _) = gateway(Script::Output("out\n", "warn\n"));
        let output = gateway.execute("cmd", &params()).await.unwrap();

        assert!(output.starts_with("Command executed with errors:"));
        assert!(output.contains("warn"));
        assert!(output.contains("out"));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_connecting() {
        let (gateway, recorder) = gateway(Script::Output("", ""));
        let params = ConnectionParams::new("vm", "admin");

        let report = gateway.execute("id", &params).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::ConfigurationError);
        assert_eq!(recorder.connections(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_with_password_connects() {
        let (gateway, recorder) = gateway(Script::Output("ok", ""));
        let params = params().with_private_key_path("/nonexistent/key");

        assert_eq!(gateway.execute("id", &params).await.unwrap(), "ok");
        assert_eq!(recorder.connections(), 1);
    }

    #[tokio::test]
    async fn test_establish_failure_never_runs_command() {
        let (gateway, recorder) = gateway(Script::RejectAuth);
        let report = gateway.execute("reboot", &params()).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::AuthenticationFailure);
        assert!(report.message.contains("admin@192.168.1.100:22"));

        let (refusing, refused) = self::gateway(Script::Refuse);
        let report = refusing.execute("reboot", &params()).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::TransportError);

        assert!(recorder.commands().is_empty());
        assert!(refused.commands().is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_names_command_and_closes() {
        let (gateway, recorder) = gateway(Script::DropChannel);
        let report = gateway.execute("tail -f log", &params()).await.unwrap_err();

        assert_eq!(report.kind, ErrorKind::ExecutionError);
        assert!(report.message.contains("'tail -f log'"));
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_single_use_sessions_are_never_reused() {
        let (gateway, recorder) = gateway(Script::Output("ok", ""));

        gateway.execute("uptime", &params()).await.unwrap();
        gateway.execute("uptime", &params()).await.unwrap();

        assert_eq!(recorder.connections(), 2);
        assert_eq!(recorder.closes(), 2);
    }

    #[tokio::test]
    async fn test_pooled_sessions_are_reused() {
        let (gateway, recorder) = gateway(Script::Output("ok", ""));
        let gateway = gateway.with_session_policy(SessionPolicy::Pooled {
            capacity: 4,
            idle_timeout: Duration::from_secs(60),
        });

        gateway.execute("uptime", &params()).await.unwrap();
        gateway.execute("uptime", &params()).await.unwrap();
        assert_eq!(recorder.connections(), 1);
        assert_eq!(recorder.closes(), 0);

        let other_user = ConnectionParams::new("192.168.1.100", "root").with_password("secret");
        gateway.execute("uptime", &other_user).await.unwrap();
        assert_eq!(recorder.connections(), 2);

        gateway.shutdown().await;
        assert_eq!(recorder.closes(), 2);
    }

    #[tokio::test]
    async fn test_command_timeout_closes_session() {
        let (gateway, recorder) = gateway(Script::Hang);
        let gateway = gateway.with_command_timeout(Some(Duration::from_millis(50)));

        let report = gateway.execute("sleep 1000", &params()).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::TimeoutError);
        assert!(report.message.contains("sleep 1000"));
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_default_port_applies() {
        let (gateway, _) = gateway(Script::RejectAuth);
        let gateway = gateway.with_default_port(2222);

        let report = gateway.execute("id", &params()).await.unwrap_err();
        assert!(report.message.contains(":2222"));

        let report = gateway
            .execute("id", &params().with_port(2200))
            .await
            .unwrap_err();
        assert!(report.message.contains(":2200"));
    }

    #[tokio::test]
    async fn test_derived_operations_use_templates() {
        let (gateway, recorder) = gateway(Script::Output("x", ""));
        let params = params();

        gateway.read_file("/etc/hostname", &params).await.unwrap();
        gateway.disk_usage(&params).await.unwrap();
        gateway.list_directory(None, &params).await.unwrap();
        gateway.list_directory(Some("/var/log"), &params).await.unwrap();
        gateway.system_info(&params).await.unwrap();

        assert_eq!(
            recorder.commands(),
            vec![
                "cat /etc/hostname",
                "df -h",
                "ls -l .",
                "ls -l /var/log",
                "uname -a && cat /etc/os-release",
            ]
        );
    }

    #[tokio::test]
    async fn test_derived_operation_matches_execute() {
        let (gateway, _) = gateway(Script::Output("myhost\n", ""));
        let params = params();

        let sugar = gateway.read_file("/etc/hostname", &params).await;
        let direct = gateway.execute("cat /etc/hostname", &params).await;
        assert_eq!(sugar, direct);

        let sugar = gateway.list_directory(None, &params).await;
        let direct = gateway.execute("ls -l .", &params).await;
        assert_eq!(sugar, direct);
    }

    #[tokio::test]
    async fn test_command_limit_rejected_before_connecting() {
        let (gateway, recorder) = gateway(Script::Output("ok", ""));
        let gateway = gateway.with_max_chars(Some(10));

        let report = gateway
            .execute("echo this is far too long", &params())
            .await
            .unwrap_err();
        assert_eq!(report.kind, ErrorKind::ConfigurationError);
        assert!(report.message.contains("too long"));

        // The limit applies to the templated command of derived operations too
        let report = gateway
            .read_file("/var/log/syslog", &params())
            .await
            .unwrap_err();
        assert_eq!(report.kind, ErrorKind::ConfigurationError);

        let report = gateway.execute("", &params()).await.unwrap_err();
        assert_eq!(report.kind, ErrorKind::ConfigurationError);

        assert_eq!(recorder.connections(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_command_sent_verbatim() {
        let (gateway, recorder) = gateway(Script::Output("", ""));

        assert_eq!(gateway.execute("  ", &params()).await.unwrap(), "");
        assert_eq!(recorder.commands(), vec!["  "]);
    }
}
