//! In-memory [`ClusterSource`] for tests and offline demos.

use std::collections::HashSet;

use serde_json::Value;

use crate::{ClusterSource, FetchError, FetchResult};

/// Deterministic fixture source. Namespaced lists honour `metadata.namespace`;
/// resources named in `failing` return [`FetchError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    pub queues: Vec<Value>,
    pub jobs: Vec<Value>,
    pub pods: Vec<Value>,
    pub namespaces: Vec<Value>,
    pub node_metrics: Option<Value>,
    pub failing: HashSet<&'static str>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queues(mut self, v: Vec<Value>) -> Self {
        self.queues = v;
        self
    }

    pub fn with_jobs(mut self, v: Vec<Value>) -> Self {
        self.jobs = v;
        self
    }

    pub fn with_pods(mut self, v: Vec<Value>) -> Self {
        self.pods = v;
        self
    }

    pub fn with_namespaces(mut self, v: Vec<Value>) -> Self {
        self.namespaces = v;
        self
    }

    pub fn with_node_metrics(mut self, v: Value) -> Self {
        self.node_metrics = Some(v);
        self
    }

    /// Make every call touching `resource` (`queues`, `jobs`, `pods`,
    /// `namespaces`, `metrics`) fail.
    pub fn failing(mut self, resource: &'static str) -> Self {
        self.failing.insert(resource);
        self
    }

    fn check(&self, resource: &'static str) -> FetchResult<()> {
        if self.failing.contains(resource) {
            return Err(FetchError::Unavailable(format!("{resource} (mock)")));
        }
        Ok(())
    }
}

fn meta<'a>(v: &'a Value, field: &str) -> Option<&'a str> {
    v.get("metadata").and_then(|m| m.get(field)).and_then(|x| x.as_str())
}

fn in_namespace(items: &[Value], namespace: Option<&str>) -> Vec<Value> {
    items
        .iter()
        .filter(|o| namespace.map_or(true, |ns| meta(o, "namespace") == Some(ns)))
        .cloned()
        .collect()
}

fn find(items: &[Value], resource: &str, namespace: Option<&str>, name: &str) -> FetchResult<Value> {
    items
        .iter()
        .find(|o| meta(o, "name") == Some(name) && namespace.map_or(true, |ns| meta(o, "namespace") == Some(ns)))
        .cloned()
        .ok_or_else(|| FetchError::NotFound(format!("{resource}/{name}")))
}

#[async_trait::async_trait]
impl ClusterSource for MockSource {
    async fn list_queues(&self) -> FetchResult<Vec<Value>> {
        self.check("queues")?;
        Ok(self.queues.clone())
    }

    async fn get_queue(&self, name: &str) -> FetchResult<Value> {
        self.check("queues")?;
        find(&self.queues, "queues", None, name)
    }

    async fn list_jobs(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>> {
        self.check("jobs")?;
        Ok(in_namespace(&self.jobs, namespace))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> FetchResult<Value> {
        self.check("jobs")?;
        find(&self.jobs, "jobs", Some(namespace), name)
    }

    async fn list_pods(&self, namespace: Option<&str>) -> FetchResult<Vec<Value>> {
        self.check("pods")?;
        Ok(in_namespace(&self.pods, namespace))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Value> {
        self.check("pods")?;
        find(&self.pods, "pods", Some(namespace), name)
    }

    async fn list_namespaces(&self) -> FetchResult<Vec<Value>> {
        self.check("namespaces")?;
        Ok(self.namespaces.clone())
    }

    async fn node_metrics(&self) -> FetchResult<Value> {
        self.check("metrics")?;
        self.node_metrics.clone().ok_or_else(|| FetchError::Unavailable("metrics.k8s.io not served".into()))
    }
}
