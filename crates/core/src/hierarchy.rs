//! Hierarchy composition: queues own jobs, jobs own tasks, tasks own pods.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Job, Pod, Queue, Task, TaskKey};

/// A queue in the composed tree together with the jobs submitted to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueNode {
    pub parent: Option<String>,
    pub uid: Option<String>,
    pub creation_timestamp: Option<String>,
    pub state: Option<String>,
    pub weight: Option<i64>,
    pub reclaimable: bool,
    pub jobs: Vec<JobNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobNode {
    pub name: String,
    pub namespace: Option<String>,
    pub creation_timestamp: Option<String>,
    pub uid: Option<String>,
    pub state: String,
    pub queue: Option<String>,
    pub tasks_count: usize,
    pub tasks: Vec<Task>,
}

impl From<Job> for JobNode {
    fn from(j: Job) -> Self {
        Self {
            name: j.name,
            namespace: j.namespace,
            creation_timestamp: j.creation_timestamp,
            uid: j.uid,
            state: j.state,
            queue: j.queue,
            tasks_count: j.tasks.len(),
            tasks: j.tasks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub phase: Option<String>,
    pub start_time: Option<String>,
}

/// The composed tree. Rebuilt from scratch on every fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    pub queues: BTreeMap<String, QueueNode>,
    pub pod_map: BTreeMap<TaskKey, Vec<PodSummary>>,
    pub total_count: usize,
    /// Jobs whose queue is missing or unknown.
    pub orphans: Vec<JobNode>,
    /// Queues taking part in a parent cycle, sorted by name.
    pub cycles: Vec<String>,
}

impl Hierarchy {
    /// Pods correlated to the given task key.
    pub fn pods_for(&self, key: &TaskKey) -> &[PodSummary] {
        self.pod_map.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn job_count(&self) -> usize {
        self.queues.values().map(|q| q.jobs.len()).sum()
    }
}

/// Compose flat queue, job and pod lists into a [`Hierarchy`].
///
/// Never fails: jobs without a known queue land in `orphans`, pods missing
/// either correlation value are dropped, and parent cycles are reported in
/// `cycles` rather than rejected.
pub fn compose(queues: Vec<Queue>, jobs: Vec<Job>, pods: Vec<Pod>) -> Hierarchy {
    let mut by_queue: HashMap<String, Vec<JobNode>> = HashMap::new();
    let known: BTreeSet<&str> = queues.iter().map(|q| q.name.as_str()).collect();
    let mut orphans = Vec::new();
    for job in jobs {
        match job.queue.as_deref() {
            Some(q) if known.contains(q) => by_queue.entry(q.to_string()).or_default().push(job.into()),
            _ => orphans.push(JobNode::from(job)),
        }
    }
    let cycles = find_cycles(&queues);

    let mut out = BTreeMap::new();
    for q in queues {
        let jobs = by_queue.remove(&q.name).unwrap_or_default();
        out.insert(
            q.name,
            QueueNode {
                parent: q.parent,
                uid: q.uid,
                creation_timestamp: q.creation_timestamp,
                state: q.state,
                weight: q.weight,
                reclaimable: q.reclaimable,
                jobs,
            },
        );
    }

    let mut pod_map: BTreeMap<TaskKey, Vec<PodSummary>> = BTreeMap::new();
    let mut uncorrelated = 0usize;
    for pod in pods {
        let Some(key) = pod.correlation else {
            uncorrelated += 1;
            continue;
        };
        pod_map.entry(key).or_default().push(PodSummary {
            name: pod.name,
            namespace: pod.namespace,
            uid: pod.uid,
            phase: pod.phase,
            start_time: pod.start_time,
        });
    }

    debug!(queues = out.len(), orphans = orphans.len(), uncorrelated, cycles = cycles.len(), "hierarchy composed");
    Hierarchy { total_count: out.len(), queues: out, pod_map, orphans, cycles }
}

fn find_cycles(queues: &[Queue]) -> Vec<String> {
    let parents: HashMap<&str, &str> = queues
        .iter()
        .filter_map(|q| q.parent.as_deref().map(|p| (q.name.as_str(), p)))
        .collect();
    let mut in_cycle: BTreeSet<String> = BTreeSet::new();
    let mut settled: BTreeSet<&str> = BTreeSet::new();
    for q in queues {
        let mut chain: Vec<&str> = Vec::new();
        let mut cur = Some(q.name.as_str());
        while let Some(name) = cur {
            if settled.contains(name) {
                break;
            }
            if let Some(pos) = chain.iter().position(|c| *c == name) {
                in_cycle.extend(chain[pos..].iter().map(|s| s.to_string()));
                break;
            }
            chain.push(name);
            cur = parents.get(name).copied();
        }
        settled.extend(chain);
    }
    in_cycle.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(name: &str, parent: Option<&str>) -> Queue {
        Queue {
            name: name.into(),
            uid: None,
            creation_timestamp: None,
            state: Some("Open".into()),
            weight: Some(1),
            reclaimable: false,
            parent: parent.map(|p| p.into()),
        }
    }

    fn job(name: &str, queue: Option<&str>, tasks: &[&str]) -> Job {
        Job {
            name: name.into(),
            namespace: Some("default".into()),
            uid: None,
            creation_timestamp: None,
            queue: queue.map(|q| q.into()),
            state: "Running".into(),
            tasks: tasks
                .iter()
                .map(|t| Task { name: (*t).into(), replicas: Some(1), min_available: None, max_retry: None, containers: 1 })
                .collect(),
        }
    }

    fn pod(name: &str, key: Option<(&str, &str)>) -> Pod {
        Pod {
            name: name.into(),
            namespace: Some("default".into()),
            uid: None,
            phase: Some("Running".into()),
            start_time: None,
            correlation: key.map(|(j, t)| TaskKey::new(j, t)),
        }
    }

    #[test]
    fn attaches_jobs_to_their_queue_only() {
        let h = compose(
            vec![queue("q1", None), queue("q2", Some("q1"))],
            vec![job("j1", Some("q2"), &["t1"])],
            vec![pod("p1", Some(("j1", "t1")))],
        );
        assert!(h.queues["q1"].jobs.is_empty());
        assert_eq!(h.queues["q2"].jobs.len(), 1);
        assert_eq!(h.queues["q2"].jobs[0].name, "j1");
        assert_eq!(h.queues["q2"].parent.as_deref(), Some("q1"));
        assert_eq!(h.pods_for(&TaskKey::new("j1", "t1")).len(), 1);
        assert_eq!(h.total_count, 2);
    }

    #[test]
    fn unknown_queue_jobs_become_orphans() {
        let h = compose(
            vec![queue("q1", None)],
            vec![job("lost", Some("nope"), &[]), job("none", None, &[]), job("ok", Some("q1"), &[])],
            vec![],
        );
        let names: Vec<_> = h.orphans.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["lost", "none"]);
        assert_eq!(h.job_count(), 1);
    }

    #[test]
    fn uncorrelated_pods_are_dropped() {
        let h = compose(vec![], vec![], vec![pod("a", None), pod("b", Some(("j", "t"))), pod("c", Some(("j", "t")))]);
        assert_eq!(h.pod_map.len(), 1);
        let names: Vec<_> = h.pods_for(&TaskKey::new("j", "t")).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn job_order_within_queue_is_input_order() {
        let h = compose(
            vec![queue("q", None)],
            vec![job("b", Some("q"), &[]), job("a", Some("q"), &[])],
            vec![],
        );
        let names: Vec<_> = h.queues["q"].jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn parent_cycles_are_flagged() {
        let h = compose(
            vec![queue("a", Some("b")), queue("b", Some("a")), queue("c", Some("a")), queue("d", None)],
            vec![],
            vec![],
        );
        assert_eq!(h.cycles, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(h.queues.len(), 4);
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let h = compose(vec![queue("s", Some("s"))], vec![], vec![]);
        assert_eq!(h.cycles, vec!["s".to_string()]);
    }

    #[test]
    fn serializes_pod_map_with_string_keys() {
        let h = compose(vec![], vec![], vec![pod("p", Some(("j1", "t1")))]);
        let v = serde_json::to_value(&h).expect("json");
        assert_eq!(v["podMap"]["j1::t1"][0]["name"], "p");
        assert_eq!(v["totalCount"], 0);
    }
}
