//! Static content listener with hot root swapping.
//!
//! [`ContentServerManager::rebind`] retires the current listener and starts a
//! new one over a different root on the same port:
//!
//! 1. The old server stops accepting; in-flight responses keep streaming.
//! 2. The new listener binds, retrying while the port is still held.
//! 3. The old server gets the grace period to drain. Connections still open
//!    after that are severed: their socket I/O fails and hyper drops them.
//!
//! At most one listener is accepting at any instant, and a request that
//! arrives after `rebind` returns is served from the new root.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::serve::Listener;
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::DaemonError;

/// How long a retired listener may keep serving in-flight responses.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// How long a severed server may take to wind down before its task is aborted.
const SEVER_TIMEOUT: Duration = Duration::from_secs(1);

/// The listener currently accepting content requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
}

struct ServerHandle {
    info: ServerInfo,
    shutdown: oneshot::Sender<()>,
    sever: CancellationToken,
    task: JoinHandle<()>,
    in_flight: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// Stop accepting; the returned future drains, then severs leftovers.
    fn retire(self, grace: Duration) -> impl Future<Output = ()> {
        let _ = self.shutdown.send(());
        drain(self.info, self.task, self.sever, grace)
    }
}

/// Owns the single accepting content listener.
pub struct ContentServerManager {
    current: Mutex<Option<ServerHandle>>,
    grace: Duration,
    host: IpAddr,
}

impl Default for ContentServerManager {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ContentServerManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            grace,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Bind on `host` instead of all interfaces.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Serve `root` on `port`, retiring whatever listener is active.
    ///
    /// Concurrent calls are serialized. On a bind failure no listener is left
    /// accepting and the error is returned.
    pub async fn rebind(&self, root: &Path, port: u16) -> Result<ServerInfo, DaemonError> {
        let mut current = self.current.lock().await;

        if let Some(old) = current.take() {
            tracing::info!(
                stage = "drain",
                root = %old.info.root.display(),
                in_flight = old.in_flight.load(Ordering::SeqCst),
                "retiring content listener"
            );
            tokio::spawn(old.retire(self.grace));
        }

        let addr = SocketAddr::new(self.host, port);
        let listener = bind_with_retry(addr, self.grace)
            .await
            .map_err(|source| {
                tracing::error!(stage = "bind", %addr, error = %source, "content listener bind failed");
                DaemonError::Bind { addr, source }
            })?;
        let bound = listener.local_addr().map_err(|source| DaemonError::Bind { addr, source })?;

        let handle = spawn_server(listener, bound, root);
        let info = handle.info.clone();
        tracing::info!(
            stage = "rebind",
            addr = %info.addr,
            root = %info.root.display(),
            "content listener serving"
        );
        *current = Some(handle);
        Ok(info)
    }

    pub async fn current(&self) -> Option<ServerInfo> {
        self.current.lock().await.as_ref().map(|h| h.info.clone())
    }

    pub async fn current_root(&self) -> Option<PathBuf> {
        self.current().await.map(|info| info.root)
    }

    /// Requests currently being answered by the accepting listener.
    pub async fn in_flight(&self) -> usize {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|h| h.in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Stop accepting and wait (up to the grace period) for the drain.
    pub async fn shutdown(&self) {
        let Some(old) = self.current.lock().await.take() else {
            return;
        };
        tracing::info!(
            root = %old.info.root.display(),
            in_flight = old.in_flight.load(Ordering::SeqCst),
            "stopping content listener"
        );
        old.retire(self.grace).await;
    }
}

fn spawn_server(listener: TcpListener, addr: SocketAddr, root: &Path) -> ServerHandle {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let counter = in_flight.clone();
    let app = Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            let guard = InFlight::enter(counter.clone());
            async move {
                let response = next.run(req).await;
                drop(guard);
                response
            }
        }))
        .layer(TraceLayer::new_for_http());

    let sever = CancellationToken::new();
    let listener = SeverableListener {
        inner: listener,
        sever: sever.clone(),
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = result {
            tracing::error!(%addr, error = %err, "content listener failed");
        }
    });

    ServerHandle {
        info: ServerInfo {
            addr,
            root: root.to_path_buf(),
            started_at: Utc::now(),
        },
        shutdown: shutdown_tx,
        sever,
        task,
        in_flight,
    }
}

async fn drain(
    info: ServerInfo,
    mut task: JoinHandle<()>,
    sever: CancellationToken,
    grace: Duration,
) {
    if tokio::time::timeout(grace, &mut task).await.is_ok() {
        tracing::info!(root = %info.root.display(), "content listener drained");
        return;
    }
    tracing::warn!(
        root = %info.root.display(),
        grace_ms = grace.as_millis() as u64,
        "grace period elapsed; closing remaining connections"
    );
    sever.cancel();
    if tokio::time::timeout(SEVER_TIMEOUT, &mut task).await.is_err() {
        task.abort();
    }
}

/// Accepts connections whose I/O fails once `sever` is cancelled.
struct SeverableListener {
    inner: TcpListener,
    sever: CancellationToken,
}

impl Listener for SeverableListener {
    type Io = SeverableStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let (stream, addr) = Listener::accept(&mut self.inner).await;
        let severed = Box::pin(self.sever.clone().cancelled_owned());
        (SeverableStream { stream, severed }, addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

struct SeverableStream {
    stream: TcpStream,
    severed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl SeverableStream {
    fn check(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        match self.severed.as_mut().poll(cx) {
            Poll::Ready(()) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "grace period elapsed",
            )),
            Poll::Pending => Ok(()),
        }
    }
}

impl AsyncRead for SeverableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(err) = this.check(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SeverableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(err) = this.check(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(err) = this.check(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

async fn bind_with_retry(addr: SocketAddr, budget: Duration) -> std::io::Result<TcpListener> {
    let deadline = Instant::now() + budget;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err)
                if err.kind() == std::io::ErrorKind::AddrInUse && Instant::now() < deadline =>
            {
                tracing::debug!(%addr, "port still held by the retiring listener; retrying");
                tokio::time::sleep(BIND_RETRY_INTERVAL).await;
            }
            Err(err) => return Err(err),
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
