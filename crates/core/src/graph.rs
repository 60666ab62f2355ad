//! Graph projection: one node per queue, job, task and pod; one animated edge
//! per parent/child or task/pod relationship.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::hierarchy::Hierarchy;
use crate::model::TaskKey;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Queue,
    Job,
    Task,
    Pod,
}

/// How node and edge ids are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// Random id per projection; selection does not survive a refresh.
    #[default]
    Fresh,
    /// Derived from the entity's natural key; identical across refreshes.
    Stable,
}

impl IdStrategy {
    fn id(self, natural: &str) -> String {
        match self {
            IdStrategy::Fresh => Uuid::new_v4().to_string(),
            IdStrategy::Stable => format!("{:016x}", crate::fnv1a(natural)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum NodePayload {
    Queue {
        label: String,
        uid: Option<String>,
        creation_timestamp: Option<String>,
        state: Option<String>,
        weight: Option<i64>,
        reclaimable: bool,
        parent: Option<String>,
    },
    Job {
        label: String,
        namespace: Option<String>,
        uid: Option<String>,
        creation_timestamp: Option<String>,
        state: String,
        tasks_count: usize,
    },
    Task {
        label: String,
        job: String,
        replicas: Option<i64>,
        min_available: Option<i64>,
        max_retry: Option<i64>,
        containers: usize,
    },
    Pod {
        label: String,
        namespace: Option<String>,
        uid: Option<String>,
        phase: Option<String>,
        start_time: Option<String>,
    },
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Queue { .. } => NodeKind::Queue,
            NodePayload::Job { .. } => NodeKind::Job,
            NodePayload::Task { .. } => NodeKind::Task,
            NodePayload::Pod { .. } => NodeKind::Pod,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodePayload::Queue { label, .. }
            | NodePayload::Job { label, .. }
            | NodePayload::Task { label, .. }
            | NodePayload::Pod { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
    #[serde(flatten)]
    pub payload: NodePayload,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub data: NodeData,
    pub position: Position,
    /// Rendered size reported by the client, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Size>,
}

impl Node {
    fn new(id: String, payload: NodePayload) -> Self {
        Self {
            id,
            kind: payload.kind(),
            data: NodeData { payload, selected: false },
            position: Position::default(),
            measured: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub animated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Relationships dropped because an endpoint had no node.
    #[serde(default)]
    pub skipped: usize,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

struct Projector {
    ids: IdStrategy,
    graph: Graph,
    queue_ids: HashMap<String, String>,
    task_ids: HashMap<TaskKey, String>,
}

impl Projector {
    fn push_node(&mut self, natural: &str, payload: NodePayload) -> String {
        let id = self.ids.id(natural);
        self.graph.nodes.push(Node::new(id.clone(), payload));
        id
    }

    fn push_edge(&mut self, source: Option<&String>, target: Option<&String>) {
        match (source, target) {
            (Some(s), Some(t)) => {
                let id = self.ids.id(&format!("{s}->{t}"));
                self.graph.edges.push(Edge { id, source: s.clone(), target: t.clone(), animated: true });
            }
            _ => self.graph.skipped += 1,
        }
    }
}

/// Project a [`Hierarchy`] into nodes and edges.
///
/// Edge endpoints are resolved through the ids assigned while creating nodes;
/// a relationship whose endpoint never received a node (a parent queue that was
/// not fetched, pods of a task no job declares) is skipped and counted in
/// [`Graph::skipped`].
pub fn project(h: &Hierarchy, ids: IdStrategy) -> Graph {
    let mut p = Projector { ids, graph: Graph::default(), queue_ids: HashMap::new(), task_ids: HashMap::new() };

    for (qname, q) in &h.queues {
        let id = p.push_node(
            &format!("queue:{qname}"),
            NodePayload::Queue {
                label: qname.clone(),
                uid: q.uid.clone(),
                creation_timestamp: q.creation_timestamp.clone(),
                state: q.state.clone(),
                weight: q.weight,
                reclaimable: q.reclaimable,
                parent: q.parent.clone(),
            },
        );
        p.queue_ids.insert(qname.clone(), id);
    }

    for (qname, q) in &h.queues {
        if let Some(parent) = &q.parent {
            let (s, t) = (p.queue_ids.get(parent).cloned(), p.queue_ids.get(qname).cloned());
            p.push_edge(s.as_ref(), t.as_ref());
        }
        for job in &q.jobs {
            let ns = job.namespace.as_deref().unwrap_or("");
            let job_id = p.push_node(
                &format!("job:{ns}/{}", job.name),
                NodePayload::Job {
                    label: job.name.clone(),
                    namespace: job.namespace.clone(),
                    uid: job.uid.clone(),
                    creation_timestamp: job.creation_timestamp.clone(),
                    state: job.state.clone(),
                    tasks_count: job.tasks_count,
                },
            );
            let queue_id = p.queue_ids.get(qname).cloned();
            p.push_edge(queue_id.as_ref(), Some(&job_id));
            for task in &job.tasks {
                let key = TaskKey::new(job.name.as_str(), task.name.as_str());
                let task_id = p.push_node(
                    &format!("task:{ns}/{key}"),
                    NodePayload::Task {
                        label: task.name.clone(),
                        job: job.name.clone(),
                        replicas: task.replicas,
                        min_available: task.min_available,
                        max_retry: task.max_retry,
                        containers: task.containers,
                    },
                );
                p.push_edge(Some(&job_id), Some(&task_id));
                p.task_ids.insert(key, task_id);
            }
        }
    }

    for (key, pods) in &h.pod_map {
        let Some(task_id) = p.task_ids.get(key).cloned() else {
            p.graph.skipped += pods.len();
            continue;
        };
        for pod in pods {
            let ns = pod.namespace.as_deref().unwrap_or("");
            let pod_id = p.push_node(
                &format!("pod:{ns}/{}", pod.name),
                NodePayload::Pod {
                    label: pod.name.clone(),
                    namespace: pod.namespace.clone(),
                    uid: pod.uid.clone(),
                    phase: pod.phase.clone(),
                    start_time: pod.start_time.clone(),
                },
            );
            p.push_edge(Some(&task_id), Some(&pod_id));
        }
    }

    debug!(nodes = p.graph.nodes.len(), edges = p.graph.edges.len(), skipped = p.graph.skipped, "graph projected");
    p.graph
}
