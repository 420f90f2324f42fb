//! Response builders
//!
//! Helpers for the handful of response shapes the service sends.

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Response, StatusCode};
use serde::Serialize;

use crate::error::Result;

/// Content type of JSON bodies
pub const JSON: &str = "application/json";

/// Content type of plain-text bodies
pub const TEXT: &str = "text/plain; charset=utf-8";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// A response with a JSON-serialized body
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Response<Bytes>> {
    let body = serde_json::to_vec(value)?;
    Ok(with_body(status, JSON, Bytes::from(body)))
}

/// A response with a body of the given content type
pub fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// A plain-text response
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Bytes> {
    with_body(status, TEXT, body.into())
}

/// A response without a body
pub fn empty(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// A JSON error response: `{"error": message}`
pub fn error(status: StatusCode, message: &str) -> Response<Bytes> {
    let body = serde_json::to_vec(&ErrorBody { error: message }).unwrap_or_default();
    with_body(status, JSON, Bytes::from(body))
}

/// 405 listing the methods the path does accept
pub fn method_not_allowed(allow: &'static str) -> Response<Bytes> {
    let mut response = error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}
