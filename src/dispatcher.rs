//! Request Dispatcher
//!
//! Turns an HTTP request into one repository call and the outcome into an
//! HTTP response. This is the only place that maps error kinds to status
//! codes.
//!
//! ## Routes
//! - `GET /healthz` → "OK"
//! - `GET /metrics` → counter exposition
//! - `GET|POST /todos` → list / create
//! - `GET|PUT|DELETE /todos/{id}` → get / update / delete
//!
//! Paths are percent-decoded before routing, so `/todos/%31` is `/todos/1`.

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;

use crate::error::{Result, TodoKvError};
use crate::metrics::{self, Metrics};
use crate::model::{NewTodo, TodoPatch};
use crate::protocol::response;
use crate::repository::TodoRepository;

/// Recognized request paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Health,
    Metrics,
    Collection,
    /// `/todos/{segment}`; the segment is not yet validated as an id
    Item(&'a str),
    Unknown,
}

impl<'a> Route<'a> {
    /// Classify a request path
    pub fn parse(path: &'a str) -> Self {
        match path {
            "/healthz" => Route::Health,
            "/metrics" => Route::Metrics,
            "/todos" => Route::Collection,
            _ => match path.strip_prefix("/todos/") {
                Some(segment) => Route::Item(segment),
                None => Route::Unknown,
            },
        }
    }
}

/// Parse a path segment as a Todo id
///
/// Only plain base-10 digits that fit in a u64 are ids; anything else
/// (signs, whitespace, extra segments) is a validation error.
pub fn parse_id(segment: &str) -> Result<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TodoKvError::Validation(format!(
            "invalid todo id: {:?}",
            segment
        )));
    }
    segment
        .parse()
        .map_err(|_| TodoKvError::Validation(format!("todo id out of range: {}", segment)))
}

/// Routes requests to the repository and records metrics
pub struct Dispatcher {
    repo: TodoRepository,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    /// Create a dispatcher over a repository and a metrics sink
    pub fn new(repo: TodoRepository, metrics: Arc<Metrics>) -> Self {
        Self { repo, metrics }
    }

    /// Handle one request
    pub fn dispatch(&self, request: &Request<Bytes>) -> Response<Bytes> {
        self.metrics.requests_total.inc();

        let response = match decode_path(request.uri().path()) {
            Ok(path) => match Route::parse(&path) {
                Route::Health => self.handle_health(request.method()),
                Route::Metrics => self.handle_metrics(request.method()),
                Route::Collection => self.handle_collection(request.method(), request.body()),
                Route::Item(segment) => self.handle_item(request.method(), segment, request.body()),
                Route::Unknown => response::error(StatusCode::NOT_FOUND, "no such route"),
            },
            Err(e) => self.error_response(&e),
        };

        tracing::debug!(
            method = %request.method(),
            path = request.uri().path(),
            status = response.status().as_u16(),
            "request handled"
        );
        self.metrics.record_response(response.status().as_u16());

        response
    }

    /// Answer a request that could not be parsed at all
    pub fn reject(&self, err: &TodoKvError) -> Response<Bytes> {
        self.metrics.requests_total.inc();
        let response = self.error_response(err);
        self.metrics.record_response(response.status().as_u16());
        response
    }

    fn handle_health(&self, method: &Method) -> Response<Bytes> {
        if method != Method::GET {
            return response::method_not_allowed("GET");
        }
        self.metrics.healthchecks_total.inc();

        match self.repo.health() {
            Ok(()) => response::text(StatusCode::OK, "OK"),
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                response::error(StatusCode::INTERNAL_SERVER_ERROR, "storage not accessible")
            }
        }
    }

    fn handle_metrics(&self, method: &Method) -> Response<Bytes> {
        if method != Method::GET {
            return response::method_not_allowed("GET");
        }
        match self.metrics.encode() {
            Ok(text) => response::with_body(StatusCode::OK, metrics::CONTENT_TYPE, Bytes::from(text)),
            Err(e) => self.error_response(&e),
        }
    }

    fn handle_collection(&self, method: &Method, body: &[u8]) -> Response<Bytes> {
        let result = match *method {
            Method::GET => self.repo.list().and_then(|todos| {
                self.metrics.todos_fetched_total.inc();
                response::json(StatusCode::OK, &todos)
            }),
            Method::POST => decode_body::<NewTodo>(body)
                .and_then(|new| self.repo.create(new.text))
                .and_then(|todo| {
                    self.metrics.todos_created_total.inc();
                    response::json(StatusCode::CREATED, &todo)
                }),
            _ => return response::method_not_allowed("GET, POST"),
        };

        result.unwrap_or_else(|e| self.error_response(&e))
    }

    fn handle_item(&self, method: &Method, segment: &str, body: &[u8]) -> Response<Bytes> {
        // The id is checked before the method, so a bad id is always 400
        let id = match parse_id(segment) {
            Ok(id) => id,
            Err(e) => return self.error_response(&e),
        };

        let result = match *method {
            Method::GET => self
                .repo
                .get(id)
                .and_then(|todo| response::json(StatusCode::OK, &todo)),
            Method::PUT => decode_body::<TodoPatch>(body).and_then(|patch| {
                let todo = self.repo.update(id, &patch)?;
                // An empty patch is answered without a commit
                if !patch.is_empty() {
                    self.metrics.todos_updated_total.inc();
                }
                response::json(StatusCode::OK, &todo)
            }),
            Method::DELETE => self.repo.delete(id).map(|()| {
                self.metrics.todos_deleted_total.inc();
                response::empty(StatusCode::NO_CONTENT)
            }),
            _ => return response::method_not_allowed("GET, PUT, DELETE"),
        };

        result.unwrap_or_else(|e| self.error_response(&e))
    }

    /// Map an error kind to its status code
    fn error_response(&self, err: &TodoKvError) -> Response<Bytes> {
        match err {
            TodoKvError::NotFound(id) => {
                self.metrics.todos_not_found_total.inc();
                tracing::debug!(id, "todo not found");
                response::error(StatusCode::NOT_FOUND, &err.to_string())
            }
            TodoKvError::Validation(_) | TodoKvError::Protocol(_) => {
                tracing::debug!(error = %err, "bad request");
                response::error(StatusCode::BAD_REQUEST, &err.to_string())
            }
            TodoKvError::BodyTooLarge { .. } => {
                response::error(StatusCode::PAYLOAD_TOO_LARGE, &err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "request failed");
                response::error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
            }
        }
    }
}

/// Percent-decode a request path
fn decode_path(path: &str) -> Result<std::borrow::Cow<'_, str>> {
    percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| TodoKvError::Validation("request path is not valid UTF-8".to_string()))
}

/// Decode a JSON body; any failure is the client's
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(TodoKvError::Validation("missing request body".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| TodoKvError::Validation(format!("invalid body: {}", e)))
}
