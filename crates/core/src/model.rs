//! Read-only snapshots of Volcano queues, jobs and pods.
//!
//! Parsing is tolerant: a missing or mistyped field becomes `None` (or a
//! default), and only an object without `metadata.name` is rejected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::state::resolve_job_state;

/// Annotation/label carrying the owning Volcano job name on a pod.
pub const JOB_NAME_KEY: &str = "volcano.sh/job-name";
/// Annotation/label carrying the owning task name on a pod.
pub const TASK_SPEC_KEY: &str = "volcano.sh/task-spec";

fn meta_str<'a>(v: &'a Value, field: &str) -> Option<&'a str> {
    v.get("metadata").and_then(|m| m.get(field)).and_then(|x| x.as_str())
}

fn path<'a>(v: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(v, |cur, s| cur.get(*s))
}

fn owned(v: Option<&str>) -> Option<String> {
    v.filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// A Volcano `scheduling.volcano.sh/v1beta1` Queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub name: String,
    pub uid: Option<String>,
    pub creation_timestamp: Option<String>,
    pub state: Option<String>,
    pub weight: Option<i64>,
    pub reclaimable: bool,
    pub parent: Option<String>,
}

impl Queue {
    pub fn from_value(v: &Value) -> Option<Self> {
        let name = owned(meta_str(v, "name"))?;
        Some(Self {
            name,
            uid: owned(meta_str(v, "uid")),
            creation_timestamp: owned(meta_str(v, "creationTimestamp")),
            state: owned(path(v, &["status", "state"]).and_then(|x| x.as_str())),
            weight: path(v, &["spec", "weight"]).and_then(|x| x.as_i64()),
            reclaimable: path(v, &["spec", "reclaimable"]).and_then(|x| x.as_bool()).unwrap_or(false),
            parent: owned(path(v, &["spec", "parent"]).and_then(|x| x.as_str())),
        })
    }
}

/// A homogeneous replica group embedded in a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub replicas: Option<i64>,
    pub min_available: Option<i64>,
    pub max_retry: Option<i64>,
    /// Number of containers in the pod template.
    pub containers: usize,
}

impl Task {
    pub fn from_value(v: &Value) -> Option<Self> {
        let name = owned(v.get("name").and_then(|x| x.as_str()))?;
        let containers = path(v, &["template", "spec", "containers"])
            .and_then(|x| x.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        Some(Self {
            name,
            replicas: v.get("replicas").and_then(|x| x.as_i64()),
            min_available: v.get("minAvailable").and_then(|x| x.as_i64()),
            max_retry: v.get("maxRetry").and_then(|x| x.as_i64()),
            containers,
        })
    }
}

/// A Volcano `batch.volcano.sh/v1alpha1` Job with its state already resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub creation_timestamp: Option<String>,
    pub queue: Option<String>,
    pub state: String,
    pub tasks: Vec<Task>,
}

impl Job {
    pub fn from_value(v: &Value) -> Option<Self> {
        let name = owned(meta_str(v, "name"))?;
        let tasks = path(v, &["spec", "tasks"])
            .and_then(|x| x.as_array())
            .map(|a| a.iter().filter_map(Task::from_value).collect())
            .unwrap_or_default();
        Some(Self {
            name,
            namespace: owned(meta_str(v, "namespace")),
            uid: owned(meta_str(v, "uid")),
            creation_timestamp: owned(meta_str(v, "creationTimestamp")),
            queue: owned(path(v, &["spec", "queue"]).and_then(|x| x.as_str())),
            state: resolve_job_state(v.get("status")),
            tasks,
        })
    }
}

/// Correlation key `(jobName, taskName)`; renders as `job::task`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub job: String,
    pub task: String,
}

impl TaskKey {
    pub fn new(job: impl Into<String>, task: impl Into<String>) -> Self {
        Self { job: job.into(), task: task.into() }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (job, task) = s.split_once("::")?;
        Some(Self::new(job, task))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.job, self.task)
    }
}

impl Serialize for TaskKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TaskKey::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid task key: {s} (expect job::task)")))
    }
}

/// A pod with its scheduler-attached correlation key, if both values are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub phase: Option<String>,
    pub start_time: Option<String>,
    pub correlation: Option<TaskKey>,
}

impl Pod {
    pub fn from_value(v: &Value) -> Option<Self> {
        let name = owned(meta_str(v, "name"))?;
        let job = correlation_value(v, JOB_NAME_KEY);
        let task = correlation_value(v, TASK_SPEC_KEY);
        Some(Self {
            name,
            namespace: owned(meta_str(v, "namespace")),
            uid: owned(meta_str(v, "uid")),
            phase: owned(path(v, &["status", "phase"]).and_then(|x| x.as_str())),
            start_time: owned(path(v, &["status", "startTime"]).and_then(|x| x.as_str())),
            correlation: job.zip(task).map(|(j, t)| TaskKey::new(j, t)),
        })
    }
}

// Annotations first, labels second.
fn correlation_value(v: &Value, key: &str) -> Option<String> {
    ["annotations", "labels"]
        .iter()
        .find_map(|section| owned(path(v, &["metadata", section, key]).and_then(|x| x.as_str())))
}

/// Parse every item of a list, dropping entries the parser rejects.
pub fn parse_all<T>(items: &[Value], parse: fn(&Value) -> Option<T>) -> Vec<T> {
    items.iter().filter_map(parse).collect()
}
