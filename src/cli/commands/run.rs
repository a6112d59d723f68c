//! Run command - execute the proxy in the foreground

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::{Config, expand_path};
use crate::logging::{AuditSink, JsonlWriter, LogEvent};
use crate::relay::{Backend, Proxy, Server};

/// How long shutdown waits for queued audit events
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Effective settings for a proxy run
///
/// Precedence: command line, then configuration file, then defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub listen: String,
    pub backend: String,
    pub connect_timeout: Duration,
    pub log_path: Option<PathBuf>,
}

impl RunSettings {
    /// Merge command line arguments over a loaded configuration
    pub fn resolve(args: &RunArgs, config: &Config) -> crate::Result<Self> {
        let mut merged = config.clone();
        if let Some(listen) = &args.listen {
            merged.listen = listen.clone();
        }
        if let Some(backend) = &args.backend {
            merged.backend = backend.clone();
        }
        if let Some(timeout) = &args.connect_timeout {
            merged.connect_timeout = timeout.clone();
        }

        let expanded = merged.expand()?;
        let log_path = match &args.log {
            Some(path) => Some(PathBuf::from(expand_path(&path.to_string_lossy())?)),
            None => expanded.log_path,
        };

        Ok(Self {
            listen: expanded.listen,
            backend: expanded.backend,
            connect_timeout: expanded.connect_timeout,
            log_path,
        })
    }
}

/// Execute the run command
pub async fn execute(args: RunArgs, config: Config) -> Result<()> {
    let settings = RunSettings::resolve(&args, &config)?;

    let (audit, audit_task) = match &settings.log_path {
        Some(path) => {
            let writer = JsonlWriter::new(path)
                .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
            info!(log = %path.display(), "JSONL audit log enabled");
            let (sink, task) = AuditSink::start(writer);
            (Some(sink), Some(task))
        }
        None => (None, None),
    };

    let backend = Backend::new(&settings.backend).with_connect_timeout(settings.connect_timeout);
    let proxy = Arc::new(Proxy::new(backend).with_audit(audit.clone()));

    let mut server = Server::new(&settings.listen);
    server.bind().await.context("Failed to start proxy")?;

    info!(
        listen = %settings.listen,
        backend = %settings.backend,
        allowed = ?proxy.allow_list().commands(),
        "clamd-filter started. Press Ctrl+C to stop."
    );
    write_audit(&audit, LogEvent::proxy_start(&settings.listen, &settings.backend)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let handler_proxy = Arc::clone(&proxy);
    server
        .run(
            move |stream| {
                let proxy = Arc::clone(&handler_proxy);
                async move { proxy.handle_client(stream).await }
            },
            shutdown_rx,
        )
        .await
        .context("Proxy server failed")?;

    write_audit(&audit, LogEvent::proxy_stop(&settings.listen)).await;

    // Sessions still draining hold their own sink clones
    drop(audit);
    drop(proxy);
    if let Some(task) = audit_task {
        if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, task).await.is_err() {
            warn!("Timed out writing remaining audit log events");
        }
    }
    info!("Shutdown complete");

    Ok(())
}

async fn write_audit(audit: &Option<AuditSink>, event: LogEvent) {
    if let Some(sink) = audit {
        sink.log(event).await;
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping..."),
        _ = terminate => info!("Received SIGTERM, stopping..."),
    }
}
