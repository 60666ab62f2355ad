//! vdash-api — REST and SSE surface of the Volcano dashboard.
//!
//! Handlers are thin: fetch through the injected [`ClusterSource`], filter or
//! compose with `vdash-core`, serialize.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/jobs` | Filtered job list (`namespace`, `search`, `queue`, `status`) |
//! | GET | `/api/jobs/{namespace}/{name}` | Single job |
//! | GET | `/api/job/{namespace}/{name}/yaml` | Job as YAML |
//! | GET | `/api/queues` | Filtered, paginated queues (`page`, `limit`, `search`, `state`) |
//! | GET | `/api/queues/{name}` | Single queue |
//! | GET | `/api/queue/{name}/yaml` | Queue as YAML |
//! | GET | `/api/namespaces` | Namespaces |
//! | GET | `/api/pods` | Filtered pod list (`namespace`, `search`, `status`) |
//! | GET | `/api/pod/{namespace}/{name}/yaml` | Pod as YAML |
//! | GET | `/api/pod/logs` | SSE log tail (`namespace`, `pod`, `container`, optional `tailLines`, `sinceSeconds`) |
//! | GET | `/api/all-jobs` | All jobs with resolved `{state, phase}` |
//! | GET | `/api/all-queues` | All queues |
//! | GET | `/api/all-pods` | All pods |
//! | GET | `/api/hierarchical-queues` | Composed queue/job/task/pod hierarchy |
//! | GET | `/api/graph` | Projected and laid out hierarchy graph |
//! | GET | `/api/usage` | Node metrics from `metrics.k8s.io` |
//! | GET | `/healthz` | Liveness |

#![forbid(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod logs;

use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use metrics::{counter, histogram};
use vdash_core::{LayeredLayout, LayoutEngine};
use vdash_kubehub::ClusterSource;
use vdash_ops::PodLogs;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub source: Arc<dyn ClusterSource>,
    pub logs: Arc<dyn PodLogs>,
    pub layout: Arc<dyn LayoutEngine>,
}

impl ApiState {
    pub fn new(source: Arc<dyn ClusterSource>, logs: Arc<dyn PodLogs>) -> Self {
        Self { source, logs, layout: Arc::new(LayeredLayout) }
    }

    pub fn with_layout(mut self, layout: Arc<dyn LayoutEngine>) -> Self {
        self.layout = layout;
        self
    }
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/{namespace}/{name}", get(handlers::get_job))
        .route("/job/{namespace}/{name}/yaml", get(handlers::job_yaml))
        .route("/queues", get(handlers::list_queues))
        .route("/queues/{name}", get(handlers::get_queue))
        .route("/queue/{name}/yaml", get(handlers::queue_yaml))
        .route("/namespaces", get(handlers::list_namespaces))
        .route("/pods", get(handlers::list_pods))
        .route("/pod/logs", get(logs::pod_logs))
        .route("/pod/{namespace}/{name}/yaml", get(handlers::pod_yaml))
        .route("/all-jobs", get(handlers::all_jobs))
        .route("/all-queues", get(handlers::all_queues))
        .route("/all-pods", get(handlers::all_pods))
        .route("/hierarchical-queues", get(handlers::hierarchical_queues))
        // Spelling used by existing frontends.
        .route("/heirarchical-queues", get(handlers::hierarchical_queues))
        .route("/graph", get(handlers::graph))
        .route("/usage", get(handlers::usage))
        .route_layer(middleware::from_fn(track))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/healthz", get(|| async { "ok" }))
        .layer(middleware::from_fn(allow_any_origin))
}

async fn track(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let t0 = std::time::Instant::now();
    let resp = next.run(req).await;
    let status = resp.status().as_u16().to_string();
    counter!("vdash_api_requests_total", 1, "route" => route.clone(), "status" => status);
    histogram!("vdash_api_request_ms", t0.elapsed().as_millis() as f64, "route" => route);
    resp
}

async fn allow_any_origin(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}
