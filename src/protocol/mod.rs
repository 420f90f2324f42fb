//! Protocol Module
//!
//! HTTP message helpers shared by the server and the dispatcher. Framing
//! (keep-alive, chunked bodies, `Expect: 100-continue`) is hyper's job;
//! this module only turns bodies into bytes and builds responses.
//!
//! Messages reach the dispatcher as the `http` crate's `Request<Bytes>`
//! and leave it as `Response<Bytes>`.

mod body;
pub mod response;

pub use body::read_body;
