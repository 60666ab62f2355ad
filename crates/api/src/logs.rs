//! Server-sent log tail for a single container.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;
use vdash_ops::{LogOptions, StreamHandle};

use crate::{ApiError, ApiState};

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub container: Option<String>,
    #[serde(rename = "tailLines")]
    pub tail_lines: Option<i64>,
    #[serde(rename = "sinceSeconds")]
    pub since_seconds: Option<i64>,
}

fn required(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

/// Stream `namespace/pod/container` logs as SSE `data:` events. The upstream
/// follow stream lives exactly as long as the client connection.
pub async fn pod_logs(State(state): State<ApiState>, Query(q): Query<LogsQuery>) -> Result<Response, ApiError> {
    let (Some(namespace), Some(pod), Some(container)) = (required(q.namespace), required(q.pod), required(q.container))
    else {
        return Err(ApiError::BadRequest {
            summary: "Missing namespace, pod, or container",
            message: "namespace, pod and container query parameters are required".to_string(),
        });
    };
    info!(namespace = %namespace, pod = %pod, container = %container, tail = ?q.tail_lines, "api: pod logs");
    let opts = LogOptions { tail_lines: q.tail_lines, since_seconds: q.since_seconds, ..LogOptions::default() };

    let StreamHandle { mut rx, cancel } = state
        .logs
        .logs(&namespace, &pod, Some(&container), opts)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch data")(format!("{e:#}")))?;

    let stream = async_stream::stream! {
        // Dropped with the response body, which stops the upstream pump.
        let _cancel = cancel;
        while let Some(chunk) = rx.recv().await {
            // SSE fields cannot carry bare carriage returns.
            yield Ok::<_, Infallible>(Event::default().data(chunk.line.replace('\r', "")));
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")).into_response())
}
