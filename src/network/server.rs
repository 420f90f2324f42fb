//! HTTP Server
//!
//! Accepts connections on a tokio runtime and hands each one to hyper.
//!
//! ```text
//!   accept loop ──► connection task 1 ─┐            ┌─► blocking pool
//!   (select on      connection task 2 ─┼─► hyper ───┤   (storage calls)
//!    shutdown)      connection task N ─┘            └─► Dispatcher
//! ```
//!
//! At most `max_connections` connections are served at once. Past that
//! the acceptor answers 503 itself instead of queueing them.

use std::convert::Infallible;
use std::net::{self, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use http::{Request, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::network::Connection;
use crate::protocol::response;

/// How long a rejected client gets to send the request it will be refused
const BUSY_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Cloneable handle that stops a running server
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and drain its connections
    ///
    /// Safe to call from any thread, including a signal handler thread.
    pub fn shutdown(&self) {
        self.signal.send_replace(true);
    }

    /// Check whether shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.signal.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

/// HTTP server for the Todo service
pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    listener: net::TcpListener,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the listener; no connection is accepted until `run` or `serve`
    pub fn bind(config: Config, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = net::TcpListener::bind(&config.listen_addr)?;
        // Required before the socket is handed to tokio
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            dispatcher,
            listener,
            shutdown: ShutdownHandle::default(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping the server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve on a dedicated runtime until shutdown is requested (blocking)
    ///
    /// The runtime runs `worker_threads` async workers, and storage calls
    /// are capped at the same number of blocking threads.
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .max_blocking_threads(self.config.worker_threads)
            .thread_name("todokv-worker")
            .enable_all()
            .build()?;

        tracing::info!("Started runtime with {} worker threads", self.config.worker_threads);
        runtime.block_on(self.serve())
    }

    /// Serve on the current runtime until shutdown is requested
    ///
    /// Requests already in flight are finished before this returns.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::from_std(self.listener)?;
        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        // Step 1: Accept loop
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Cannot set TCP_NODELAY for {}: {}", peer_addr, e);
                    }

                    match Arc::clone(&limit).try_acquire_owned() {
                        Ok(permit) => {
                            let conn = Connection::new(
                                Arc::clone(&self.dispatcher),
                                self.config.max_body_size,
                                peer_addr,
                            )
                            .with_header_timeout(self.config.read_timeout_ms);
                            let stop = self.shutdown.subscribe();
                            connections.spawn(async move {
                                conn.serve(stream, stop).await;
                                drop(permit);
                            });
                        }
                        Err(_) => {
                            tracing::warn!("Connection limit reached, rejecting {}", peer_addr);
                            connections.spawn(reject_busy(stream));
                        }
                    }
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }

            while let Some(joined) = connections.try_join_next() {
                log_join(joined);
            }
        }

        // Step 2: Drain. Each connection saw the same signal and is winding down
        tracing::info!("Shutting down, waiting for in-flight requests");
        drop(listener);
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Resolves once shutdown has been requested
pub(crate) async fn shutdown_requested(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|stop| *stop).await.is_err() {
        tracing::debug!("Shutdown handle dropped");
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("Connection task panicked");
        }
    }
}

/// Answer one request with 503 and close
async fn reject_busy(stream: TcpStream) {
    let service = service_fn(|_request: Request<Incoming>| async {
        Ok::<_, Infallible>(
            response::error(StatusCode::SERVICE_UNAVAILABLE, "server busy").map(Full::new),
        )
    });

    let mut builder = http1::Builder::new();
    builder.keep_alive(false);
    let conn = builder.serve_connection(TokioIo::new(stream), service);

    match tokio::time::timeout(BUSY_REPLY_TIMEOUT, conn).await {
        Ok(Err(e)) => tracing::debug!("Busy reply failed: {}", e),
        Err(_) => tracing::debug!("Rejected client sent no request"),
        Ok(Ok(())) => {}
    }
}
