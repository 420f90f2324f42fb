//! Prometheus metrics for the Todo service.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::error::{Result, TodoKvError};

/// Content type of the text exposition
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Labels for response-by-status counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub status: u16,
}

/// Container for all service counters.
///
/// Every counter is an atomic, so concurrent handlers never lose updates.
pub struct Metrics {
    registry: Registry,

    /// Every request received.
    pub requests_total: Counter,

    /// Successful list requests.
    pub todos_fetched_total: Counter,

    /// Todos created.
    pub todos_created_total: Counter,

    /// Todos updated.
    pub todos_updated_total: Counter,

    /// Todos deleted.
    pub todos_deleted_total: Counter,

    /// Lookups of ids that do not exist.
    pub todos_not_found_total: Counter,

    /// Calls to /healthz.
    pub healthchecks_total: Counter,

    /// Responses by HTTP status code.
    pub responses_total: Family<ResponseLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all counters registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Counter::default();
        registry.register(
            "todoapp_requests",
            "Total HTTP requests",
            requests_total.clone(),
        );

        let todos_fetched_total = Counter::default();
        registry.register(
            "todoapp_todos_fetched",
            "Total times the todo list was fetched",
            todos_fetched_total.clone(),
        );

        let todos_created_total = Counter::default();
        registry.register(
            "todoapp_todos_created",
            "Total todos created",
            todos_created_total.clone(),
        );

        let todos_updated_total = Counter::default();
        registry.register(
            "todoapp_todos_updated",
            "Total todos updated",
            todos_updated_total.clone(),
        );

        let todos_deleted_total = Counter::default();
        registry.register(
            "todoapp_todos_deleted",
            "Total todos deleted",
            todos_deleted_total.clone(),
        );

        let todos_not_found_total = Counter::default();
        registry.register(
            "todoapp_todos_not_found",
            "Total lookups of todos that do not exist",
            todos_not_found_total.clone(),
        );

        let healthchecks_total = Counter::default();
        registry.register(
            "todoapp_healthchecks",
            "Total calls to /healthz",
            healthchecks_total.clone(),
        );

        let responses_total = Family::<ResponseLabels, Counter>::default();
        registry.register(
            "todoapp_http_responses",
            "Total HTTP responses by status code",
            responses_total.clone(),
        );

        Self {
            registry,
            requests_total,
            todos_fetched_total,
            todos_created_total,
            todos_updated_total,
            todos_deleted_total,
            todos_not_found_total,
            healthchecks_total,
            responses_total,
        }
    }

    /// Count one response with the given status.
    pub fn record_response(&self, status: u16) {
        self.responses_total
            .get_or_create(&ResponseLabels { status })
            .inc();
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .map_err(|e| TodoKvError::Serialization(format!("metrics encoding failed: {}", e)))?;
        Ok(buffer)
    }
}
