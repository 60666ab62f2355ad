//! Human-readable rendering for `tree` and `graph`.

use chrono::{DateTime, Utc};
use vdash_core::{Graph, Hierarchy, JobNode, NodeKind};

/// Compact age like `3d`, `5h`, `42m`, `10s`; `-` when unknown or in the future.
pub fn age(ts: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(t) = ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
        return "-".to_string();
    };
    let secs = (now - t.with_timezone(&Utc)).num_seconds();
    match secs {
        s if s < 0 => "-".to_string(),
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

fn job_lines(out: &mut Vec<String>, h: &Hierarchy, job: &JobNode, indent: &str, now: DateTime<Utc>) {
    let ns = job.namespace.as_deref().unwrap_or("-");
    out.push(format!(
        "{indent}job {ns}/{} [{}] tasks={} age={}",
        job.name,
        job.state,
        job.tasks_count,
        age(job.creation_timestamp.as_deref(), now)
    ));
    for task in &job.tasks {
        let replicas = task.replicas.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        out.push(format!("{indent}  task {} replicas={replicas}", task.name));
        for pod in h.pods_for(&vdash_core::TaskKey::new(&job.name, &task.name)) {
            out.push(format!(
                "{indent}    pod {} [{}] age={}",
                pod.name,
                pod.phase.as_deref().unwrap_or("Unknown"),
                age(pod.start_time.as_deref(), now)
            ));
        }
    }
}

/// Indented queue → job → task → pod listing. Queues print in name order.
pub fn tree(h: &Hierarchy, now: DateTime<Utc>) -> String {
    let mut out = Vec::new();
    for (name, q) in &h.queues {
        let mut head = format!("queue {name} [{}]", q.state.as_deref().unwrap_or("Unknown"));
        if let Some(p) = &q.parent {
            head.push_str(&format!(" parent={p}"));
        }
        if let Some(w) = q.weight {
            head.push_str(&format!(" weight={w}"));
        }
        out.push(head);
        for job in &q.jobs {
            job_lines(&mut out, h, job, "  ", now);
        }
    }
    if !h.orphans.is_empty() {
        out.push("(no queue)".to_string());
        for job in &h.orphans {
            job_lines(&mut out, h, job, "  ", now);
        }
    }
    if !h.cycles.is_empty() {
        out.push(format!("warning: queue parent cycle: {}", h.cycles.join(", ")));
    }
    out.join("\n")
}

/// One line per node with its position; the selected node is starred.
pub fn graph(g: &Graph) -> String {
    let mut out: Vec<String> = g
        .nodes
        .iter()
        .map(|n| {
            let mark = if n.data.selected { "*" } else { " " };
            format!(
                "{mark} {:<5} {:<40} ({:.0}, {:.0})",
                format!("{:?}", n.kind).to_lowercase(),
                n.data.payload.label(),
                n.position.x,
                n.position.y
            )
        })
        .collect();
    out.push(format!(
        "{} queues, {} jobs, {} tasks, {} pods, {} edges",
        g.count(NodeKind::Queue),
        g.count(NodeKind::Job),
        g.count(NodeKind::Task),
        g.count(NodeKind::Pod),
        g.edges.len()
    ));
    if g.skipped > 0 {
        out.push(format!("{} relationships skipped", g.skipped));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use vdash_core::model::{parse_all, Job, Pod, Queue};
    use vdash_core::{compose, project, IdStrategy};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn ages() {
        assert_eq!(age(Some("2024-05-02T11:59:30Z"), now()), "30s");
        assert_eq!(age(Some("2024-05-02T10:00:00Z"), now()), "2h");
        assert_eq!(age(Some("2024-04-29T12:00:00Z"), now()), "3d");
        assert_eq!(age(Some("not a time"), now()), "-");
        assert_eq!(age(None, now()), "-");
    }

    #[test]
    fn tree_lists_pods_under_their_task() {
        let queues = [json!({"metadata": {"name": "q1"}, "status": {"state": "Open"}})];
        let jobs = [json!({
            "metadata": {"name": "j1", "namespace": "ns", "creationTimestamp": "2024-05-02T11:00:00Z"},
            "spec": {"queue": "q1", "tasks": [{"name": "t1", "replicas": 2}]},
            "status": "Pending"
        })];
        let pods = [json!({
            "metadata": {"name": "p1", "namespace": "ns",
                "annotations": {"volcano.sh/job-name": "j1", "volcano.sh/task-spec": "t1"}},
            "status": {"phase": "Running"}
        })];
        let h = compose(
            parse_all(&queues, Queue::from_value),
            parse_all(&jobs, Job::from_value),
            parse_all(&pods, Pod::from_value),
        );
        let text = tree(&h, now());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "queue q1 [Open]");
        assert_eq!(lines[1], "  job ns/j1 [Running] tasks=1 age=1h");
        assert_eq!(lines[2], "    task t1 replicas=2");
        assert_eq!(lines[3], "      pod p1 [Running] age=-");

        let g = project(&h, IdStrategy::Stable);
        assert!(graph(&g).ends_with("1 queues, 1 jobs, 1 tasks, 1 pods, 3 edges"));
    }
}
