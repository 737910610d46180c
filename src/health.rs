//! Health server for Kubernetes probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (are all watch loops established?)
//! - `/metrics` - Prometheus metrics

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::watch::EventVerb;

/// Labels for watch event metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EventLabels {
    pub kind: String,
    pub verb: String,
}

impl prometheus_client::encoding::EncodeLabelSet for EventLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("verb", self.verb.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for workflow metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WorkflowLabels {
    pub workflow: String,
}

impl prometheus_client::encoding::EncodeLabelSet for WorkflowLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("workflow", self.workflow.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-cluster metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub cluster: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ClusterLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Events dispatched by the watch loops
    pub watch_events_total: Family<EventLabels, Counter>,
    /// Workflow runs
    pub workflow_runs_total: Family<WorkflowLabels, Counter>,
    /// Failed workflow runs
    pub workflow_errors_total: Family<WorkflowLabels, Counter>,
    /// Workflow duration histogram
    pub workflow_duration_seconds: Family<WorkflowLabels, Histogram>,
    /// Replicas created by scale-up
    pub replicas_provisioned_total: Family<ClusterLabels, Counter>,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let watch_events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "pgcluster_operator_watch_events",
            "Total number of dispatched watch events",
            watch_events_total.clone(),
        );

        let workflow_runs_total = Family::<WorkflowLabels, Counter>::default();
        registry.register(
            "pgcluster_operator_workflow_runs",
            "Total number of workflow runs",
            workflow_runs_total.clone(),
        );

        let workflow_errors_total = Family::<WorkflowLabels, Counter>::default();
        registry.register(
            "pgcluster_operator_workflow_errors",
            "Total number of failed workflow runs",
            workflow_errors_total.clone(),
        );

        let workflow_duration_seconds =
            Family::<WorkflowLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "pgcluster_operator_workflow_duration_seconds",
            "Duration of workflow runs in seconds",
            workflow_duration_seconds.clone(),
        );

        let replicas_provisioned_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "pgcluster_operator_replicas_provisioned",
            "Total number of replicas created by scale-up",
            replicas_provisioned_total.clone(),
        );

        Self {
            watch_events_total,
            workflow_runs_total,
            workflow_errors_total,
            workflow_duration_seconds,
            replicas_provisioned_total,
            registry,
        }
    }

    pub fn record_watch_event(&self, kind: &str, verb: EventVerb) {
        let labels = EventLabels {
            kind: kind.to_string(),
            verb: verb.to_string(),
        };
        self.watch_events_total.get_or_create(&labels).inc();
    }

    /// Record a finished workflow run
    pub fn record_workflow(&self, workflow: &str, duration_secs: f64, succeeded: bool) {
        let labels = WorkflowLabels {
            workflow: workflow.to_string(),
        };
        self.workflow_runs_total.get_or_create(&labels).inc();
        self.workflow_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
        if !succeeded {
            self.workflow_errors_total.get_or_create(&labels).inc();
        }
    }

    pub fn record_replica(&self, namespace: &str, cluster: &str) {
        let labels = ClusterLabels {
            namespace: namespace.to_string(),
            cluster: cluster.to_string(),
        };
        self.replicas_provisioned_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether every watch loop is established
    pub ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the watch loops are running.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve health and metrics endpoints on `0.0.0.0:<port>`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, app).await
}
