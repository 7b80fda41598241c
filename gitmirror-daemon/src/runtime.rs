use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use gitmirror_core::{config, Config};
use gitmirror_sync::{bootstrap, BootstrapAction};

use crate::content::{ContentServerManager, DEFAULT_GRACE_PERIOD};
use crate::error::{io_err, join_err, DaemonError};
use crate::log_rotation::RotatingFile;
use crate::state::AppState;
use crate::webhook;

/// How the daemon is started.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub config_path: PathBuf,
    pub json_logs: bool,
    pub grace_period: Duration,
}

impl ServeOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            json_logs: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(options: ServeOptions) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options))
}

/// Run the daemon until ctrl-c.
///
/// Startup failures (configuration, logging, bootstrap clone, initial binds)
/// are returned; once both listeners are up only a listener crash ends it.
pub async fn run(options: ServeOptions) -> Result<(), DaemonError> {
    let created = !options.config_path.exists();
    let cfg = config::load_or_init_at(&options.config_path)?;
    cfg.validate()?;
    init_tracing(&cfg, options.json_logs)?;

    if created {
        tracing::info!(
            path = %options.config_path.display(),
            "configuration file created from defaults and environment"
        );
    }
    tracing::info!(
        version = %cfg.version,
        repo = %cfg.repo_url,
        active = %cfg.active_partition,
        large_file_mode = cfg.lfs_enabled,
        "configuration loaded"
    );
    if cfg.webhook_secret.is_empty() {
        tracing::warn!("webhook_secret is empty; notification authentication is disabled");
    }

    let action = bootstrap_active(&cfg).await?;
    tracing::info!(?action, "active partition ready");

    let content = ContentServerManager::new(options.grace_period);
    let state = Arc::new(AppState::new(&cfg, options.config_path.clone(), content));
    let partitions = state.partitions().await;
    state
        .content
        .rebind(partitions.active_path(), cfg.static_port)
        .await?;

    let webhook_addr = SocketAddr::from(([0, 0, 0, 0], cfg.webhook_port));
    let listener = TcpListener::bind(webhook_addr)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: webhook_addr,
            source,
        })?;
    tracing::info!(addr = %webhook_addr, "notification listener serving");

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let webhook_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = serve_webhook(listener, state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(io_err("ctrl-c handler", err)),
                }
            }
        })
    };

    let (webhook_result, signal_result) = tokio::join!(webhook_handle, signal_handle);
    state.content.shutdown().await;

    handle_join("webhook_server", webhook_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Serve the notification routes until a shutdown is broadcast.
pub async fn serve_webhook(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let addr = listener.local_addr().map_err(|e| io_err("webhook listener", e))?;
    axum::serve(listener, webhook::router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(format!("webhook listener {addr}"), e))
}

async fn bootstrap_active(cfg: &Config) -> Result<BootstrapAction, DaemonError> {
    let source = cfg.source();
    let partitions = cfg.partitions();
    let update_on_start = cfg.update_on_start;
    let action =
        tokio::task::spawn_blocking(move || bootstrap(&source, &partitions, update_on_start))
            .await
            .map_err(join_err("bootstrap"))??;
    Ok(action)
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(join_err(task)(err)),
    }
}

/// Tee log output to stdout and the rotating log file.
fn init_tracing(cfg: &Config, json: bool) -> Result<(), DaemonError> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let file = open_log(&cfg.log_file_path, cfg.log_max_bytes())?;
    let writer = std::io::stdout.and(Mutex::new(file));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    Ok(())
}

fn open_log(path: &Path, max_bytes: u64) -> Result<RotatingFile, DaemonError> {
    RotatingFile::open(path, max_bytes).map_err(|e| io_err(path, e))
}

/// Plain stderr logging for one-shot commands.
pub fn init_console_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
