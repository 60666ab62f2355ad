#![forbid(unsafe_code)]

use serde_json::{json, Value};
use vdash_core::model::{parse_all, JOB_NAME_KEY, TASK_SPEC_KEY};
use vdash_core::prelude::*;
use vdash_core::NodeKind;

fn queue(name: &str, parent: Option<&str>) -> Value {
    let mut spec = json!({"weight": 1, "reclaimable": true});
    if let Some(p) = parent {
        spec["parent"] = Value::String(p.to_string());
    }
    json!({"metadata": {"name": name, "uid": format!("uid-{name}")}, "spec": spec, "status": {"state": "Open"}})
}

fn job(name: &str, queue: &str, tasks: &[&str], status: Value) -> Value {
    let tasks: Vec<Value> = tasks.iter().map(|t| json!({"name": t, "replicas": 1})).collect();
    json!({"metadata": {"name": name, "namespace": "default"}, "spec": {"queue": queue, "tasks": tasks}, "status": status})
}

fn pod(name: &str, labels: Value) -> Value {
    json!({"metadata": {"name": name, "namespace": "default", "labels": labels}, "status": {"phase": "Running"}})
}

fn build(queues: &[Value], jobs: &[Value], pods: &[Value]) -> Hierarchy {
    compose(parse_all(queues, Queue::from_value), parse_all(jobs, Job::from_value), parse_all(pods, Pod::from_value))
}

#[test]
fn two_level_queue_with_one_job_task_and_pod() {
    let h = build(
        &[queue("q1", None), queue("q2", Some("q1"))],
        &[job("j1", "q2", &["t1"], json!({"state": {"phase": "Running"}}))],
        &[pod("p1", json!({JOB_NAME_KEY: "j1", TASK_SPEC_KEY: "t1"}))],
    );
    assert!(h.queues["q1"].jobs.is_empty());
    let names: Vec<_> = h.queues["q2"].jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["j1"]);
    let pods: Vec<_> = h.pods_for(&TaskKey::new("j1", "t1")).iter().map(|p| p.name.as_str()).collect();
    assert_eq!(pods, vec!["p1"]);

    // q1, q2, j1, t1, p1 with edges q1->q2, q2->j1, j1->t1, t1->p1
    let g = project(&h, IdStrategy::Fresh);
    assert_eq!(g.nodes.len(), 5);
    assert_eq!(g.edges.len(), 4);
    assert_eq!(g.skipped, 0);
}

#[test]
fn pending_string_status_displays_running() {
    let h = build(&[queue("q", None)], &[job("j", "q", &[], json!("Pending"))], &[]);
    assert_eq!(h.queues["q"].jobs[0].state, "Running");
}

#[test]
fn pod_without_task_label_is_excluded_everywhere() {
    let h = build(
        &[queue("q", None)],
        &[job("j1", "q", &["t1"], Value::Null)],
        &[pod("p1", json!({JOB_NAME_KEY: "j1"}))],
    );
    assert!(h.pod_map.is_empty());
    let g = project(&h, IdStrategy::Fresh);
    assert_eq!(g.count(NodeKind::Pod), 0);
}

#[test]
fn every_correlated_pod_lands_in_exactly_one_list() {
    let pods: Vec<Value> = (0..6)
        .map(|i| pod(&format!("p{i}"), json!({JOB_NAME_KEY: format!("j{}", i % 2), TASK_SPEC_KEY: "t"})))
        .collect();
    let h = build(&[], &[], &pods);
    let total: usize = h.pod_map.values().map(|v| v.len()).sum();
    assert_eq!(total, 6);
    for i in 0..6 {
        let name = format!("p{i}");
        let hits = h.pod_map.values().filter(|v| v.iter().any(|p| p.name == name)).count();
        assert_eq!(hits, 1, "{name}");
    }
}

#[test]
fn full_pipeline_selects_and_lays_out() {
    let h = build(
        &[queue("root", None), queue("a", Some("root")), queue("b", Some("root"))],
        &[job("train", "a", &["ps", "worker"], json!("Running")), job("stray", "gone", &["x"], json!("Failed"))],
        &[pod("train-ps-0", json!({JOB_NAME_KEY: "train", TASK_SPEC_KEY: "ps"}))],
    );
    assert_eq!(h.orphans.len(), 1);
    let mut g = project(&h, IdStrategy::Stable);
    vdash_core::LayeredLayout.compute(&mut g, &LayoutOptions::default()).expect("layout");

    let pod_id = g.nodes.iter().find(|n| n.kind == NodeKind::Pod).map(|n| n.id.clone()).expect("pod node");
    assert_eq!(reconcile(&mut g.nodes, &SelectionEvent::Activate(pod_id.clone())), Some(pod_id));
    assert_eq!(g.nodes.iter().filter(|n| n.data.selected).count(), 1);

    let root_y = g.nodes.iter().find(|n| n.data.payload.label() == "root").map(|n| n.position.y);
    let pod_y = g.nodes.iter().find(|n| n.kind == NodeKind::Pod).map(|n| n.position.y);
    assert!(root_y < pod_y);
}
