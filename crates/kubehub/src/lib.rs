//! Volcano dashboard kubehub – kube client wiring and the `ClusterSource` capability
//!
//! Everything that talks to the API server goes through [`ClusterSource`], so
//! the HTTP layer and the composer can be driven by [`MockSource`] in tests.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::{
    api::{Api, ListParams},
    config::KubeConfigOptions,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client, Config,
};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

mod mock;

pub use mock::MockSource;

/// A custom resource addressed by group/version/kind plus its plural.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomResource {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl CustomResource {
    pub fn gvk_key(&self) -> String {
        format!("{}/{}/{}", self.group, self.version, self.kind)
    }

    fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, self.kind);
        ApiResource::from_gvk_with_plural(&gvk, self.plural)
    }
}

pub const VOLCANO_JOBS: CustomResource =
    CustomResource { group: "batch.volcano.sh", version: "v1alpha1", kind: "Job", plural: "jobs" };
pub const VOLCANO_QUEUES: CustomResource =
    CustomResource { group: "scheduling.volcano.sh", version: "v1beta1", kind: "Queue", plural: "queues" };
pub const NODE_METRICS: CustomResource =
    CustomResource { group: "metrics.k8s.io", version: "v1beta1", kind: "NodeMetrics", plural: "nodes" };

/// Errors surfaced by a [`ClusterSource`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("kube: {0}")]
    Kube(#[from] kube::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Read access to the Volcano and core objects the dashboard renders.
/// Objects are returned as raw JSON exactly as the API server served them.
#[async_trait::async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_queues(&self) -> FetchResult<Vec<Value>>;
    async fn get_queue(&self, name: &str) -> FetchResult<Value>;

    /// `None` lists across all namespaces.
    async fn list_jobs(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>>;
    async fn get_job(&self, namespace: &str, name: &str) -> FetchResult<Value>;

    /// `None` lists across all namespaces.
    async fn list_pods(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>>;
    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Value>;

    async fn list_namespaces(&self) -> FetchResult<Vec<Value>>;

    /// Node usage from `metrics.k8s.io`, as the list object `{items: [...]}`.
    async fn node_metrics(&self) -> FetchResult<Value>;
}

/// Build a kube client from the default kubeconfig chain, optionally pinning a context.
pub async fn connect(context: Option<&str>) -> Result<Client> {
    let client = match context {
        Some(ctx) => {
            let opts = KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
            let cfg = Config::from_kubeconfig(&opts).await.with_context(|| format!("loading kubeconfig context {ctx}"))?;
            Client::try_from(cfg).context("building kube client")?
        }
        None => Client::try_default().await.context("building default kube client")?,
    };
    info!(context = ?context, "kube client ready");
    Ok(client)
}

/// [`ClusterSource`] backed by a live kube client.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(context: Option<&str>) -> Result<Self> {
        Ok(Self::new(connect(context).await?))
    }

    fn custom(&self, cr: &CustomResource, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = cr.api_resource();
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    async fn list_custom(&self, cr: &CustomResource, namespace: Option<&str>) -> FetchResult<Vec<Value>> {
        let t0 = Instant::now();
        let list = self.custom(cr, namespace).list(&ListParams::default()).await?;
        observe("list", cr.plural, t0);
        debug!(gvk = %cr.gvk_key(), ns = ?namespace, count = list.items.len(), "listed custom objects");
        to_values(&list.items)
    }

    async fn get_custom(&self, cr: &CustomResource, namespace: Option<&str>, name: &str) -> FetchResult<Value> {
        let t0 = Instant::now();
        let obj = self.custom(cr, namespace).get(name).await.map_err(|e| not_found(e, cr.plural, name))?;
        observe("get", cr.plural, t0);
        Ok(serde_json::to_value(&obj)?)
    }
}

fn observe(op: &'static str, resource: &'static str, t0: Instant) {
    counter!("vdash_kube_requests_total", 1, "op" => op, "resource" => resource);
    histogram!("vdash_kube_request_ms", t0.elapsed().as_millis() as f64, "op" => op, "resource" => resource);
}

fn to_values<T: Serialize>(items: &[T]) -> FetchResult<Vec<Value>> {
    items.iter().map(|o| serde_json::to_value(o).map_err(FetchError::from)).collect()
}

fn not_found(e: kube::Error, resource: &str, name: &str) -> FetchError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => FetchError::NotFound(format!("{resource}/{name}")),
        other => FetchError::Kube(other),
    }
}

#[async_trait::async_trait]
impl ClusterSource for KubeSource {
    async fn list_queues(&self) -> FetchResult<Vec<Value>> {
        self.list_custom(&VOLCANO_QUEUES, None).await
    }

    async fn get_queue(&self, name: &str) -> FetchResult<Value> {
        self.get_custom(&VOLCANO_QUEUES, None, name).await
    }

    async fn list_jobs(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>> {
        self.list_custom(&VOLCANO_JOBS, namespace).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> FetchResult<Value> {
        self.get_custom(&VOLCANO_JOBS, Some(namespace), name).await
    }

    async fn list_pods(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>> {
        let t0 = Instant::now();
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api.list(&ListParams::default()).await?;
        observe("list", "pods", t0);
        to_values(&list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Value> {
        let t0 = Instant::now();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api.get(name).await.map_err(|e| not_found(e, "pods", name))?;
        observe("get", "pods", t0);
        Ok(serde_json::to_value(&pod)?)
    }

    async fn list_namespaces(&self) -> FetchResult<Vec<Value>> {
        let t0 = Instant::now();
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        observe("list", "namespaces", t0);
        to_values(&list.items)
    }

    async fn node_metrics(&self) -> FetchResult<Value> {
        let items = self.list_custom(&NODE_METRICS, None).await?;
        Ok(serde_json::json!({ "items": items }))
    }
}

/// Check that Volcano's job CRD is served and readable.
pub async fn verify_volcano(source: &dyn ClusterSource) -> bool {
    match source.list_jobs(None).await {
        Ok(jobs) => {
            info!(jobs = jobs.len(), "volcano job CRD reachable");
            true
        }
        Err(e) => {
            warn!(error = %e, "volcano verification failed");
            false
        }
    }
}

/// Raw inputs of one hierarchy composition.
#[derive(Debug, Clone, Default)]
pub struct HierarchyInputs {
    pub queues: Vec<Value>,
    pub jobs: Vec<Value>,
    pub pods: Vec<Value>,
}

/// Fetch all queues, jobs and pods cluster-wide. Any single failure fails the
/// whole fetch; no partial inputs are returned.
pub async fn fetch_hierarchy_inputs(source: &dyn ClusterSource) -> FetchResult<HierarchyInputs> {
    let t0 = Instant::now();
    let queues = source.list_queues().await?;
    let jobs = source.list_jobs(None).await?;
    let pods = source.list_pods(None).await?;
    info!(queues = queues.len(), jobs = jobs.len(), pods = pods.len(), took_ms = %t0.elapsed().as_millis(), "hierarchy inputs fetched");
    Ok(HierarchyInputs { queues, jobs, pods })
}

/// Fetch and compose in one step.
pub async fn load_hierarchy(source: &dyn ClusterSource) -> FetchResult<vdash_core::Hierarchy> {
    use vdash_core::model::{parse_all, Job, Pod as PodSnapshot, Queue};
    let inputs = fetch_hierarchy_inputs(source).await?;
    let t0 = Instant::now();
    let h = vdash_core::compose(
        parse_all(&inputs.queues, Queue::from_value),
        parse_all(&inputs.jobs, Job::from_value),
        parse_all(&inputs.pods, PodSnapshot::from_value),
    );
    histogram!("vdash_compose_ms", t0.elapsed().as_millis() as f64);
    if !h.orphans.is_empty() {
        debug!(orphans = h.orphans.len(), "jobs without a known queue");
    }
    if !h.cycles.is_empty() {
        warn!(queues = ?h.cycles, "queue parent cycle detected");
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gvk_keys() {
        assert_eq!(VOLCANO_JOBS.gvk_key(), "batch.volcano.sh/v1alpha1/Job");
        assert_eq!(VOLCANO_QUEUES.gvk_key(), "scheduling.volcano.sh/v1beta1/Queue");
    }

    #[test]
    fn api_resource_uses_plural() {
        let ar = VOLCANO_QUEUES.api_resource();
        assert_eq!(ar.plural, "queues");
        assert_eq!(ar.api_version, "scheduling.volcano.sh/v1beta1");
    }

    #[tokio::test]
    async fn any_failed_input_fails_the_whole_fetch() {
        let src = MockSource::new()
            .with_queues(vec![json!({"metadata": {"name": "q"}})])
            .with_jobs(vec![json!({"metadata": {"name": "j"}, "spec": {"queue": "q"}})])
            .failing("pods");
        assert!(fetch_hierarchy_inputs(&src).await.is_err());
        assert!(load_hierarchy(&src).await.is_err());
    }

    #[tokio::test]
    async fn loads_hierarchy_from_source() {
        let src = MockSource::new()
            .with_queues(vec![json!({"metadata": {"name": "q"}})])
            .with_jobs(vec![json!({"metadata": {"name": "j"}, "spec": {"queue": "q", "tasks": [{"name": "t"}]}})])
            .with_pods(vec![json!({"metadata": {"name": "p", "annotations": {
                "volcano.sh/job-name": "j", "volcano.sh/task-spec": "t"}}})]);
        let h = load_hierarchy(&src).await.expect("hierarchy");
        assert_eq!(h.queues["q"].jobs.len(), 1);
        assert_eq!(h.pod_map.len(), 1);
    }

    #[tokio::test]
    async fn verify_reports_unavailable_jobs_crd() {
        assert!(verify_volcano(&MockSource::new()).await);
        assert!(!verify_volcano(&MockSource::new().failing("jobs")).await);
    }
}
