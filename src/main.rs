//! Linux VM Admin - Entry point
//!
//! Parses CLI arguments, validates configuration, starts the MCP server on
//! stdio transport, and drains pooled sessions on shutdown.

use anyhow::Context;
use clap::Parser;
use rmcp::service::ServiceExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use linux_vm_admin::config::{Args, Config};
use linux_vm_admin::gateway::{Gateway, SessionPolicy};
use linux_vm_admin::server::AdminServer;
use linux_vm_admin::ssh::SessionEstablisher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr (stdout is for MCP JSON-RPC)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    info!("Linux VM admin v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Default port: {}, host trust: {:?}, connect timeout: {}s",
        config.default_port,
        config.host_trust,
        config.connect_timeout.as_secs()
    );
    info!(
        "Command timeout: {}, Max chars: {}",
        config
            .command_timeout
            .map_or("none".to_string(), |t| format!("{}ms", t.as_millis())),
        config
            .max_chars
            .map_or("unlimited".to_string(), |n| n.to_string())
    );
    if let SessionPolicy::Pooled {
        capacity,
        idle_timeout,
    } = config.session_policy
    {
        info!(
            "Session pooling enabled: {} idle sessions, {}s idle lifetime",
            capacity,
            idle_timeout.as_secs()
        );
    }

    let mut establisher = SessionEstablisher::new(config.host_trust_policy())
        .with_connect_timeout(config.connect_timeout);
    if let Some(ref path) = config.known_hosts {
        establisher = establisher.with_known_hosts(path);
    }

    let gateway = Gateway::new(establisher)
        .with_session_policy(config.session_policy)
        .with_default_port(config.default_port)
        .with_command_timeout(config.command_timeout)
        .with_max_chars(config.max_chars);

    let server = AdminServer::new(gateway);

    info!("Linux VM admin running on stdio");

    let server_for_shutdown = server.clone();

    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = terminate() => {
                info!("Received SIGTERM, shutting down...");
            }
        }

        server_for_shutdown.shutdown().await;
        std::process::exit(0);
    });

    let running_server = server
        .clone()
        .serve(rmcp::transport::io::stdio())
        .await
        .context("Failed to start MCP server")?;

    info!("MCP server is serving...");
    if let Err(e) = running_server.waiting().await {
        error!("Server error: {}", e);
    }

    shutdown_handle.abort();
    server.shutdown().await;

    info!("Linux VM admin stopped");

    Ok(())
}

/// Resolves on SIGTERM; never on platforms without it
async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
