//! Connection Handler
//!
//! Serves one client connection through hyper's HTTP/1.1 state machine.
//! Requests on a kept-alive connection are handled one after another.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::dispatcher::Dispatcher;
use crate::network::server::shutdown_requested;
use crate::protocol::{read_body, response};

/// Handles a single client connection
pub struct Connection {
    /// Routes the parsed request
    dispatcher: Arc<Dispatcher>,

    /// Largest request body accepted
    max_body_size: usize,

    /// Time allowed for a complete request head
    header_timeout: Option<Duration>,

    /// Peer address for logging
    peer_addr: SocketAddr,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(dispatcher: Arc<Dispatcher>, max_body_size: usize, peer_addr: SocketAddr) -> Self {
        Self {
            dispatcher,
            max_body_size,
            header_timeout: None,
            peer_addr,
        }
    }

    /// Close connections that take longer than `ms` to send a request head (0 disables)
    pub fn with_header_timeout(mut self, ms: u64) -> Self {
        self.header_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self
    }

    /// Serve requests until the client leaves or shutdown is signalled
    ///
    /// On shutdown an in-flight request still gets its response; an idle
    /// connection is closed right away.
    pub async fn serve(self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        tracing::trace!("Connection established from {}", self.peer_addr);

        let peer_addr = self.peer_addr;
        let mut builder = http1::Builder::new();
        if let Some(timeout) = self.header_timeout {
            builder.timer(TokioTimer::new()).header_read_timeout(timeout);
        }

        let handler = Arc::new(self);
        let service = service_fn(move |request| {
            let handler = Arc::clone(&handler);
            async move { Ok::<_, Infallible>(handler.respond(request).await) }
        });

        let conn = builder.serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = shutdown_requested(&mut shutdown) => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        match result {
            Ok(()) => tracing::trace!("Connection from {} closed", peer_addr),
            // Slow, silent or vanished clients
            Err(e) if e.is_timeout() || e.is_incomplete_message() || e.is_parse() => {
                tracing::debug!("Connection from {} ended: {}", peer_addr, e);
            }
            Err(e) => tracing::warn!("Error serving {}: {}", peer_addr, e),
        }
    }

    async fn respond(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        tracing::trace!(
            "Request from {}: {} {}",
            self.peer_addr,
            request.method(),
            request.uri()
        );

        let (parts, body) = request.into_parts();
        let body = match read_body(body, self.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                if e.is_client_error() {
                    tracing::debug!("Bad request body from {}: {}", self.peer_addr, e);
                } else {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                }
                return self.dispatcher.reject(&e).map(Full::new);
            }
        };
        let request = Request::from_parts(parts, body);

        // Storage calls block, so they run on the blocking pool
        let dispatcher = Arc::clone(&self.dispatcher);
        match tokio::task::spawn_blocking(move || dispatcher.dispatch(&request)).await {
            Ok(response) => response.map(Full::new),
            Err(e) => {
                tracing::error!("Request handler for {} failed: {}", self.peer_addr, e);
                response::error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
                    .map(Full::new)
            }
        }
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
