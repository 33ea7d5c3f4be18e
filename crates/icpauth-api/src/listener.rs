//! TLS accept loop
//!
//! Accepts TCP connections, runs the rustls handshake, captures the client
//! certificate chain and hands the stream to hyper. Every request served on a
//! connection carries a [`ClientConnection`] extension describing it.
//!
//! ```text
//!   TcpListener (SO_REUSEPORT)
//!        │  accept, connection limit
//!        ▼
//!   TLS handshake ── peer_certificates() ──► ClientConnection
//!        │
//!        ▼
//!   hyper-util auto (HTTP/1.1 + h2) ──► axum Router
//! ```

use crate::types::ClientConnection;
use anyhow::{Context, Result};
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, error, info, warn};

/// Handshakes that take longer are dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener statistics
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStats {
    /// Total connections accepted
    pub total_accepted: u64,
    /// Total connections rejected (due to limits)
    pub total_rejected: u64,
    /// Handshakes that failed or timed out
    pub total_handshake_failures: u64,
    /// Current active connections
    pub active_connections: usize,
}

#[derive(Debug, Default)]
struct ListenerState {
    accepted: AtomicU64,
    rejected: AtomicU64,
    handshake_failures: AtomicU64,
    active: AtomicU64,
}

impl ListenerState {
    fn stats(&self) -> ListenerStats {
        ListenerStats {
            total_accepted: self.accepted.load(Ordering::Relaxed),
            total_rejected: self.rejected.load(Ordering::Relaxed),
            total_handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            active_connections: self.active.load(Ordering::Relaxed) as usize,
        }
    }
}

/// Decrements the active counter when a connection task ends.
struct ActiveGuard(Arc<ListenerState>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A bound listener, TLS or plain.
pub struct HttpsListener {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    max_connections: usize,
    drain_timeout: Duration,
    state: Arc<ListenerState>,
}

impl HttpsListener {
    /// Binds `bind_addr`. Without an acceptor connections are served as plain
    /// HTTP and never carry a certificate chain.
    pub async fn bind(
        bind_addr: SocketAddr,
        acceptor: Option<TlsAcceptor>,
        max_connections: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?;

        // Enable SO_REUSEPORT for running several instances on one port
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = listener.as_raw_fd();
            let optval: libc::c_int = 1;
            // SAFETY: fd is a valid socket owned by `listener` for this call
            let rc = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_REUSEPORT,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&optval) as libc::socklen_t,
                )
            };
            if rc != 0 {
                warn!(error = %std::io::Error::last_os_error(), "Failed to set SO_REUSEPORT");
            }
        }

        info!(
            bind_addr = %listener.local_addr()?,
            tls = acceptor.is_some(),
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            listener,
            acceptor,
            max_connections,
            drain_timeout: Duration::from_secs(30),
            state: Arc::new(ListenerState::default()),
        })
    }

    /// How long [`HttpsListener::serve`] waits for open connections after
    /// shutdown is signalled.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> ListenerStats {
        self.state.stats()
    }

    /// Serves `router` until `shutdown` resolves, then waits up to the drain
    /// timeout for open connections to finish.
    pub async fn serve<F>(self, router: Router, shutdown: F) -> Result<ListenerStats>
    where
        F: Future<Output = ()> + Send,
    {
        let server_port = self.local_addr()?.port();
        let mut shutdown = std::pin::pin!(shutdown);

        info!(port = server_port, "Accept loop started");

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let current_active = self.state.active.load(Ordering::Relaxed) as usize;
            if current_active >= self.max_connections {
                warn!(
                    remote_addr = %remote_addr,
                    current = current_active,
                    max = self.max_connections,
                    "Connection limit reached, rejecting"
                );
                self.state.rejected.fetch_add(1, Ordering::Relaxed);
                drop(stream);
                continue;
            }

            self.state.accepted.fetch_add(1, Ordering::Relaxed);
            self.state.active.fetch_add(1, Ordering::Relaxed);
            let guard = ActiveGuard(Arc::clone(&self.state));

            debug!(remote_addr = %remote_addr, active = current_active + 1, "Accepted connection");

            let acceptor = self.acceptor.clone();
            let state = Arc::clone(&self.state);
            let router = router.clone();

            tokio::spawn(async move {
                let _guard = guard;
                handle_connection(stream, remote_addr, server_port, acceptor, router, state).await;
            });
        }

        let deadline = Instant::now() + self.drain_timeout;
        while self.state.active.load(Ordering::Relaxed) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stats = self.state.stats();
        if stats.active_connections > 0 {
            warn!(remaining = stats.active_connections, "Drain timeout elapsed with open connections");
        }
        info!(
            accepted = stats.total_accepted,
            rejected = stats.total_rejected,
            "Listener stopped"
        );
        Ok(stats)
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    server_port: u16,
    acceptor: Option<TlsAcceptor>,
    router: Router,
    state: Arc<ListenerState>,
) {
    let Some(acceptor) = acceptor else {
        let connection = ClientConnection::new(Vec::new(), remote_addr, server_port, false);
        serve_http(stream, connection, router).await;
        return;
    };

    let tls_stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => tls_stream,
        Ok(Err(e)) => {
            state.handshake_failures.fetch_add(1, Ordering::Relaxed);
            warn!(remote_addr = %remote_addr, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            state.handshake_failures.fetch_add(1, Ordering::Relaxed);
            warn!(remote_addr = %remote_addr, "TLS handshake timed out");
            return;
        }
    };

    let peer_chain: Vec<Vec<u8>> = tls_stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.iter().map(|cert| cert.as_ref().to_vec()).collect())
        .unwrap_or_default();

    debug!(
        remote_addr = %remote_addr,
        certificates = peer_chain.len(),
        "TLS handshake complete"
    );

    let connection = ClientConnection::new(peer_chain, remote_addr, server_port, true);
    serve_http(tls_stream, connection, router).await;
}

async fn serve_http<I>(io: I, connection: ClientConnection, router: Router)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let remote_addr = connection.remote_addr;
    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(connection.clone());
        router.clone().call(request)
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        debug!(remote_addr = %remote_addr, error = %e, "Connection closed with error");
    }

    debug!(remote_addr = %remote_addr, "Connection closed");
}
