//! REST handlers. Each one fetches through the cluster source, applies the
//! listing filters from `vdash-core`, and serializes the result.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use vdash_core::filter::{namespace_scope, paginate, JobFilter, PodFilter, QueueFilter};
use vdash_core::state::with_summary_status;
use vdash_core::{project, Direction, Graph, IdStrategy, LayoutOptions};
use vdash_kubehub::load_hierarchy;

use crate::{ApiError, ApiState};

/// List payload shared by the filtered and unfiltered listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub items: Vec<Value>,
    pub total_count: usize,
}

impl From<Vec<Value>> for Listing {
    fn from(items: Vec<Value>) -> Self {
        Self { total_count: items.len(), items }
    }
}

fn yaml_response(value: &Value, summary: &'static str) -> Result<impl IntoResponse, ApiError> {
    let body = serde_yaml::to_string(value).map_err(|e| ApiError::internal(summary)(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/yaml")], body))
}

// `parseInt` leniency: anything unparsable is treated as absent.
fn parse_int(v: &Option<String>) -> Option<i64> {
    v.as_deref().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub namespace: Option<String>,
    pub search: Option<String>,
    pub queue: Option<String>,
    pub status: Option<String>,
}

pub async fn list_jobs(State(state): State<ApiState>, Query(q): Query<JobsQuery>) -> Result<Json<Listing>, ApiError> {
    info!(namespace = ?q.namespace, search = ?q.search, queue = ?q.queue, status = ?q.status, "api: list jobs");
    let items = state
        .source
        .list_jobs(namespace_scope(q.namespace.as_deref()))
        .await
        .map_err(ApiError::upstream("Failed to fetch jobs"))?;
    let filter = JobFilter { search: q.search, queue: q.queue, status: q.status };
    let items: Vec<Value> = items.into_iter().filter(|j| filter.matches(j)).collect();
    Ok(Json(items.into()))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let job = state.source.get_job(&namespace, &name).await.map_err(ApiError::upstream("Failed to fetch job"))?;
    Ok(Json(job))
}

pub async fn job_yaml(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = "Failed to fetch job YAML";
    let job = state.source.get_job(&namespace, &name).await.map_err(ApiError::upstream(summary))?;
    yaml_response(&job, summary)
}

#[derive(Debug, Default, Deserialize)]
pub struct QueuesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub state: Option<String>,
}

pub async fn list_queues(
    State(state): State<ApiState>,
    Query(q): Query<QueuesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = (parse_int(&q.page), parse_int(&q.limit));
    info!(page = ?page, limit = ?limit, search = ?q.search, state = ?q.state, "api: list queues");
    let items = state.source.list_queues().await.map_err(ApiError::upstream("Failed to fetch queues"))?;
    let filter = QueueFilter { search: q.search, state: q.state };
    let items: Vec<Value> = items.into_iter().filter(|v| filter.matches(v)).collect();
    Ok(Json(paginate(items, page, limit)))
}

pub async fn get_queue(State(state): State<ApiState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let queue = state.source.get_queue(&name).await.map_err(ApiError::upstream("Failed to fetch queue details"))?;
    Ok(Json(queue))
}

pub async fn queue_yaml(State(state): State<ApiState>, Path(name): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let summary = "Failed to fetch queue YAML";
    let queue = state.source.get_queue(&name).await.map_err(ApiError::upstream(summary))?;
    yaml_response(&queue, summary)
}

pub async fn list_namespaces(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let items = state.source.list_namespaces().await.map_err(ApiError::upstream("Failed to fetch namespaces"))?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PodsQuery {
    pub namespace: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
}

pub async fn list_pods(State(state): State<ApiState>, Query(q): Query<PodsQuery>) -> Result<Json<Listing>, ApiError> {
    info!(namespace = ?q.namespace, search = ?q.search, status = ?q.status, "api: list pods");
    let items = state
        .source
        .list_pods(namespace_scope(q.namespace.as_deref()))
        .await
        .map_err(ApiError::upstream("Failed to fetch pods"))?;
    let filter = PodFilter { search: q.search, status: q.status };
    let items: Vec<Value> = items.into_iter().filter(|p| filter.matches(p)).collect();
    Ok(Json(items.into()))
}

pub async fn pod_yaml(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = "Failed to fetch pod YAML";
    let pod = state.source.get_pod(&namespace, &name).await.map_err(ApiError::upstream(summary))?;
    yaml_response(&pod, summary)
}

pub async fn all_jobs(State(state): State<ApiState>) -> Result<Json<Listing>, ApiError> {
    let items = state.source.list_jobs(None).await.map_err(ApiError::upstream("Failed to fetch all jobs"))?;
    Ok(Json(items.into_iter().map(with_summary_status).collect::<Vec<_>>().into()))
}

pub async fn all_queues(State(state): State<ApiState>) -> Result<Json<Listing>, ApiError> {
    let items = state.source.list_queues().await.map_err(ApiError::upstream("Failed to fetch all queues"))?;
    Ok(Json(items.into()))
}

pub async fn all_pods(State(state): State<ApiState>) -> Result<Json<Listing>, ApiError> {
    let items = state.source.list_pods(None).await.map_err(ApiError::upstream("Failed to fetch all pods"))?;
    Ok(Json(items.into()))
}

pub async fn hierarchical_queues(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let h = load_hierarchy(state.source.as_ref())
        .await
        .map_err(ApiError::upstream("Failed to generate hierarchical data."))?;
    Ok(Json(h))
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    /// Derive node ids from natural keys so they survive a refresh.
    #[serde(default)]
    pub stable: bool,
    pub direction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    #[serde(flatten)]
    pub graph: Graph,
    pub orphans: usize,
    pub cycles: Vec<String>,
}

pub async fn graph(State(state): State<ApiState>, Query(q): Query<GraphQuery>) -> Result<impl IntoResponse, ApiError> {
    let mut opts = LayoutOptions::default();
    if let Some(d) = q.direction.as_deref() {
        opts.direction = d.parse::<Direction>().map_err(|e| ApiError::BadRequest {
            summary: "Invalid layout direction",
            message: e.to_string(),
        })?;
    }
    let h = load_hierarchy(state.source.as_ref())
        .await
        .map_err(ApiError::upstream("Failed to generate hierarchical data."))?;

    let ids = if q.stable { IdStrategy::Stable } else { IdStrategy::Fresh };
    let t0 = Instant::now();
    let graph = project(&h, ids);
    histogram!("vdash_project_ms", t0.elapsed().as_secs_f64() * 1000.0);
    if graph.skipped > 0 {
        warn!(skipped = graph.skipped, "api: relationships without a node were dropped");
    }

    let graph = state
        .layout
        .layout(graph, &opts)
        .await
        .map_err(|e| ApiError::internal("Failed to lay out graph")(e.to_string()))?;
    Ok(Json(GraphResponse { graph, orphans: h.orphans.len(), cycles: h.cycles }))
}

pub async fn usage(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let metrics = state
        .source
        .node_metrics()
        .await
        .map_err(ApiError::upstream("Failed to fetch metric data | Install the metric server"))?;
    Ok(Json(json!({ "message": "Kubernetes api usage data.", "nodeMetrics": metrics })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_is_lenient() {
        assert_eq!(parse_int(&Some(" 4 ".into())), Some(4));
        assert_eq!(parse_int(&Some("x".into())), None);
        assert_eq!(parse_int(&None), None);
    }

    #[test]
    fn listing_counts_items() {
        let l: Listing = vec![json!(1), json!(2)].into();
        assert_eq!(serde_json::to_value(&l).expect("json")["totalCount"], 2);
    }
}
