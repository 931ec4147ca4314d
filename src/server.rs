//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight request run to completion and closing idle
//!    keep-alive connections.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Embedders and tests that manage their own lifecycle use
//! [`Server::serve_with_shutdown`] with any future as the signal.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::request::{BoxError, Request};
use crate::response::Response;
use crate::router::Router;

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    body_limit: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string. Use
    /// [`try_bind`](Server::try_bind) to handle that case.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use minirpc::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self::try_bind(addr).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse()
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { bind: Bind::Addr(addr), body_limit: DEFAULT_BODY_LIMIT })
    }

    /// Serves on an already-bound listener, e.g. one bound to port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Largest request body, in bytes, the server will buffer (2 MiB unless
    /// set). Larger bodies get 400 `Invalid request body` without reaching
    /// the router.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// The address the server is (or will be) bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        match &self.bind {
            Bind::Addr(addr) => Ok(*addr),
            Bind::Listener(listener) => Ok(listener.local_addr()?),
        }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing). Fails up front if the
    /// signal handlers cannot be installed.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let signal = shutdown_signal()?;
        self.serve_with_shutdown(router, async move {
            let name = signal.await;
            info!(signal = name, "shutdown requested");
        })
        .await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal` resolves.
    pub async fn serve_with_shutdown<S>(self, router: Router, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;
        let body_limit = self.body_limit;

        // Shared read-only by every connection task.
        let router = Arc::new(router);

        info!(%addr, procedures = router.procedures().len(), body_limit, "minirpc listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        // Lets shutdown tell idle keep-alive connections to close instead of
        // waiting on them forever.
        let graceful = GracefulShutdown::new();

        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
        let builder = ConnBuilder::new(TokioExecutor::new());

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        async move { dispatch(router, req, body_limit).await }
                    });

                    let conn = builder.serve_connection(TokioIo::new(stream), svc).into_owned();
                    let conn = graceful.watch(conn);

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: in-flight requests finish, idle connections close.
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}

        info!("minirpc stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request and runs it through the router.
///
/// Infallible: a body that cannot be read (or is over `body_limit`) becomes
/// a 400 here, everything else is the router's business.
async fn dispatch<B>(
    router: Arc<Router>,
    req: http::Request<B>,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let response = match Request::from_hyper(req, body_limit).await {
        Ok(req) => router.handle(req).await,
        Err(e) => {
            warn!(body_limit, "failed to read request body: {e}");
            Response::error(http::StatusCode::BAD_REQUEST, json!("Invalid request body"))
        }
    };

    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Installs the shutdown handlers and returns a future naming the first
/// signal that arrives.
///
/// Handlers are registered before this returns, so a signal sent afterwards
/// is never lost to the default disposition.
#[cfg(unix)]
fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    // Kubernetes stops pods with SIGTERM; SIGINT is Ctrl-C in a terminal.
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        }
    })
}

/// Only Ctrl-C exists off Unix.
#[cfg(not(unix))]
fn shutdown_signal() -> io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                warn!("cannot listen for Ctrl-C, shutdown must come from the process manager: {e}");
                std::future::pending().await
            }
        }
    })
}
