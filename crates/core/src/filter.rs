//! Listing filters and pagination over raw Kubernetes objects.
//!
//! A filter value that is empty or `All` is disabled, except for `search`
//! where only an empty value disables it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn enabled(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty() && *s != "All")
}

/// Namespace scope for a list call: `None` means all namespaces.
pub fn namespace_scope(ns: Option<&str>) -> Option<&str> {
    ns.filter(|s| !s.is_empty() && *s != "All")
}

fn name_of(v: &Value) -> &str {
    v.get("metadata").and_then(|m| m.get("name")).and_then(|x| x.as_str()).unwrap_or("")
}

fn str_at<'a>(v: &'a Value, segments: &[&str]) -> Option<&'a str> {
    segments.iter().try_fold(v, |cur, s| cur.get(*s)).and_then(|x| x.as_str())
}

fn name_matches(v: &Value, search: &Option<String>) -> bool {
    match search.as_deref().filter(|s| !s.is_empty()) {
        Some(term) => name_of(v).to_lowercase().contains(&term.to_lowercase()),
        None => true,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFilter {
    pub search: Option<String>,
    pub queue: Option<String>,
    /// Matched against `status.state.phase`.
    pub status: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Value) -> bool {
        name_matches(job, &self.search)
            && enabled(&self.queue).map_or(true, |q| str_at(job, &["spec", "queue"]) == Some(q))
            && enabled(&self.status).map_or(true, |s| str_at(job, &["status", "state", "phase"]) == Some(s))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueFilter {
    pub search: Option<String>,
    /// Matched against `status.state`.
    pub state: Option<String>,
}

impl QueueFilter {
    pub fn matches(&self, queue: &Value) -> bool {
        name_matches(queue, &self.search)
            && enabled(&self.state).map_or(true, |s| str_at(queue, &["status", "state"]) == Some(s))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodFilter {
    pub search: Option<String>,
    /// Matched against `status.phase`.
    pub status: Option<String>,
}

impl PodFilter {
    pub fn matches(&self, pod: &Value) -> bool {
        name_matches(pod, &self.search)
            && enabled(&self.status).map_or(true, |s| str_at(pod, &["status", "phase"]) == Some(s))
    }
}

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Slice `items` into 1-based pages. Missing or non-positive `page`/`limit`
/// fall back to 1 and 10; a page past the end is empty.
pub fn paginate<T>(items: Vec<T>, page: Option<i64>, limit: Option<i64>) -> Page<T> {
    let page = page.filter(|p| *p > 0).map(|p| p as usize).unwrap_or(DEFAULT_PAGE);
    let limit = limit.filter(|l| *l > 0).map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
    let total_count = items.len();
    let start = (page - 1).saturating_mul(limit).min(total_count);
    let end = start.saturating_add(limit).min(total_count);
    let items: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    Page { items, total_count, page, limit, total_pages: total_count.div_ceil(limit) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(name: &str, queue: &str, phase: &str) -> Value {
        json!({"metadata": {"name": name}, "spec": {"queue": queue}, "status": {"state": {"phase": phase}}})
    }

    #[test]
    fn job_filter_combines_search_queue_status() {
        let jobs = vec![job("Train-A", "q1", "Running"), job("train-b", "q2", "Running"), job("eval", "q1", "Pending")];
        let f = JobFilter { search: Some("TRAIN".into()), queue: Some("q1".into()), status: Some("Running".into()) };
        let hits: Vec<_> = jobs.iter().filter(|j| f.matches(j)).map(name_of).collect();
        assert_eq!(hits, vec!["Train-A"]);
    }

    #[test]
    fn all_disables_queue_and_status() {
        let f = JobFilter { search: None, queue: Some("All".into()), status: Some("All".into()) };
        assert!(f.matches(&job("x", "q", "Failed")));
        assert!(f.matches(&json!({"metadata": {"name": "no-status"}})));
    }

    #[test]
    fn status_filter_rejects_job_without_status() {
        let f = JobFilter { status: Some("Running".into()), ..Default::default() };
        assert!(!f.matches(&json!({"metadata": {"name": "bare"}})));
    }

    #[test]
    fn queue_and_pod_filters() {
        let q = json!({"metadata": {"name": "default"}, "status": {"state": "Open"}});
        assert!(QueueFilter { search: Some("fau".into()), state: Some("Open".into()) }.matches(&q));
        assert!(!QueueFilter { search: None, state: Some("Closed".into()) }.matches(&q));
        let p = json!({"metadata": {"name": "web-0"}, "status": {"phase": "Running"}});
        assert!(PodFilter { search: Some("WEB".into()), status: None }.matches(&p));
        assert!(!PodFilter { search: None, status: Some("Pending".into()) }.matches(&p));
    }

    #[test]
    fn namespace_scope_treats_all_as_cluster_wide() {
        assert_eq!(namespace_scope(Some("All")), None);
        assert_eq!(namespace_scope(Some("")), None);
        assert_eq!(namespace_scope(None), None);
        assert_eq!(namespace_scope(Some("dev")), Some("dev"));
    }

    #[test]
    fn paginates_with_defaults() {
        let p = paginate((0..25).collect::<Vec<_>>(), None, None);
        assert_eq!(p.items, (0..10).collect::<Vec<_>>());
        assert_eq!((p.page, p.limit, p.total_count, p.total_pages), (1, 10, 25, 3));

        let p = paginate((0..25).collect::<Vec<_>>(), Some(3), Some(10));
        assert_eq!(p.items, (20..25).collect::<Vec<_>>());

        let p = paginate((0..5).collect::<Vec<_>>(), Some(9), Some(2));
        assert!(p.items.is_empty());
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn non_positive_values_fall_back() {
        let p = paginate(vec![1, 2, 3], Some(0), Some(-4));
        assert_eq!((p.page, p.limit), (1, 10));
        assert_eq!(p.items, vec![1, 2, 3]);
        let empty: Page<i32> = paginate(vec![], None, None);
        assert_eq!(empty.total_pages, 0);
    }
}
