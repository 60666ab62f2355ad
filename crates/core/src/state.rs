//! Job state resolution.
//!
//! The displayed state follows a fixed precedence: an explicit `status.state`
//! wins; otherwise a string status of `Running`, `Completed` or `Failed` passes
//! through; `Pending` is shown as `Running`; anything else is shown as-is, or
//! `Unknown` when absent.

use serde_json::{json, Value};

pub const UNKNOWN: &str = "Unknown";

/// Resolve the user-visible state of a job from its raw `status` value.
pub fn resolve_job_state(status: Option<&Value>) -> String {
    let Some(status) = status else {
        return UNKNOWN.to_string();
    };
    if let Some(explicit) = status.get("state").and_then(explicit_state) {
        return explicit;
    }
    match status.as_str() {
        Some(raw) => resolve_state_str(raw),
        None => UNKNOWN.to_string(),
    }
}

/// The string branch of [`resolve_job_state`].
pub fn resolve_state_str(raw: &str) -> String {
    match raw {
        "Running" | "Completed" | "Failed" => raw.to_string(),
        "Pending" => "Running".to_string(),
        "" => UNKNOWN.to_string(),
        other => other.to_string(),
    }
}

// Volcano reports `status.state` as `{phase, reason, ...}`; older shapes use a bare string.
fn explicit_state(state: &Value) -> Option<String> {
    match state {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(o) => Some(
            o.get("phase")
                .and_then(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string(),
        ),
        _ => None,
    }
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Phase shown in the unpaginated job listing: `Running` when the job reports
/// a phase or declares a non-zero `minAvailable`, `Unknown` otherwise.
pub fn summary_phase(job: &Value) -> &'static str {
    let phase = job.get("status").and_then(|s| s.get("phase"));
    let min_available = job.get("spec").and_then(|s| s.get("minAvailable"));
    if truthy(phase) || truthy(min_available) {
        "Running"
    } else {
        UNKNOWN
    }
}

/// Replace a raw job's `status` with the resolved `{state, phase}` pair.
pub fn with_summary_status(mut job: Value) -> Value {
    let state = resolve_job_state(job.get("status"));
    let phase = summary_phase(&job);
    if let Some(obj) = job.as_object_mut() {
        obj.insert("status".to_string(), json!({ "state": state, "phase": phase }));
    }
    job
}
