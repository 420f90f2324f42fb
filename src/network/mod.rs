//! Network Module
//!
//! HTTP server and per-connection handling.
//!
//! ## Architecture
//! - tokio accept loop with a connection limit
//! - hyper HTTP/1.1 per connection (keep-alive, chunked bodies)
//! - Dispatcher calls on tokio's blocking pool

mod server;
mod connection;

pub use server::{Server, ShutdownHandle};
pub use connection::Connection;
