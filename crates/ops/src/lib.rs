//! Volcano dashboard ops: streaming pod logs line by line.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, LogParams},
    Client,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

pub const DEFAULT_QUEUE_CAP: usize = 1024;

/// A single line of log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogChunk {
    pub line: String,
}

/// Options for a log stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOptions {
    /// Keep the stream open for new lines.
    pub follow: bool,
    /// Prefix each line with its RFC3339 timestamp.
    pub timestamps: bool,
    pub pretty: bool,
    /// Tail last n lines (server-side), if supported
    pub tail_lines: Option<i64>,
    /// Only return logs newer than X seconds
    pub since_seconds: Option<i64>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { follow: true, timestamps: true, pretty: true, tail_lines: None, since_seconds: None }
    }
}

/// Cancellation handle for an in-flight stream. Dropping it cancels as well.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn cancel(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Result of starting a streaming operation. Dropping `rx` also stops the
/// producer at its next send.
pub struct StreamHandle<T> {
    pub rx: mpsc::Receiver<T>,
    pub cancel: CancelHandle,
}

/// Pod log streaming capability.
#[async_trait::async_trait]
pub trait PodLogs: Send + Sync {
    async fn logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        opts: LogOptions,
    ) -> Result<StreamHandle<LogChunk>>;
}

/// kube-rs backed log streaming.
#[derive(Clone)]
pub struct KubeLogs {
    client: Client,
    queue_cap: usize,
}

impl KubeLogs {
    pub fn new(client: Client, queue_cap: usize) -> Self {
        Self { client, queue_cap: queue_cap.max(1) }
    }
}

#[async_trait::async_trait]
impl PodLogs for KubeLogs {
    async fn logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        opts: LogOptions,
    ) -> Result<StreamHandle<LogChunk>> {
        if namespace.is_empty() || pod.is_empty() {
            return Err(anyhow!("namespace and pod are required for pod logs"));
        }
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let mut lp = LogParams::default();
        lp.follow = opts.follow;
        lp.timestamps = opts.timestamps;
        lp.pretty = opts.pretty;
        lp.tail_lines = opts.tail_lines;
        lp.since_seconds = opts.since_seconds;
        if let Some(c) = container {
            lp.container = Some(c.to_string());
        }

        let (tx, rx) = mpsc::channel::<LogChunk>(self.queue_cap);
        let (cancel, cancel_rx) = CancelHandle::new();
        // The task reports whether the stream opened so a missing pod or
        // container surfaces to the caller instead of as an empty stream.
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let pod_name = pod.to_string();
        let ctx = format!("{namespace}/{pod}");
        info!(pod = %ctx, container = ?container, follow = lp.follow, tail = ?lp.tail_lines, "logs stream starting");
        tokio::spawn(async move {
            use tokio_util::{compat::FuturesAsyncReadCompatExt, io::ReaderStream};
            let reader = match api.log_stream(&pod_name, &lp).await {
                Ok(r) => {
                    let _ = ready_tx.send(Ok(()));
                    r
                }
                Err(e) => {
                    warn!(pod = %ctx, error = %e, "log_stream failed to open");
                    let _ = ready_tx.send(Err(anyhow!("opening log stream for {ctx}: {e}")));
                    return;
                }
            };
            // Convert futures::io::AsyncRead into tokio::io::AsyncRead, then into a bytes Stream
            let stream = ReaderStream::new(reader.compat());
            pump_bytes_to_lines(stream, tx, cancel_rx, Some(&ctx)).await;
        });
        ready_rx.await.map_err(|_| anyhow!("log task ended before opening the stream"))??;

        Ok(StreamHandle { rx, cancel })
    }
}

/// Split a byte stream into lines and forward them until the stream ends, the
/// receiver goes away, or `cancel_rx` fires. A trailing partial line is
/// flushed at the end.
pub async fn pump_bytes_to_lines<S, E>(
    stream: S,
    tx: mpsc::Sender<LogChunk>,
    mut cancel_rx: oneshot::Receiver<()>,
    ctx: Option<&str>,
) where
    S: futures::Stream<Item = Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
{
    let ctx = ctx.unwrap_or("-");
    let stream = stream.fuse();
    futures::pin_mut!(stream);
    let mut buf = bytes::BytesMut::new();
    let mut sent = 0u64;
    'outer: loop {
        tokio::select! {
            _ = &mut cancel_rx => { info!(ctx = %ctx, "log pump cancelled"); break; }
            next = stream.next() => {
                match next {
                    Some(Ok(chunk)) => {
                        buf.extend_from_slice(&chunk);
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line = buf.split_to(pos);
                            let _ = buf.split_to(1); // drop '\n'
                            let line = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
                            if tx.send(LogChunk { line }).await.is_err() {
                                info!(ctx = %ctx, "log receiver gone");
                                break 'outer;
                            }
                            sent += 1;
                        }
                    }
                    Some(Err(e)) => { warn!(ctx = %ctx, error = %e, "log stream error"); break; }
                    None => break,
                }
            }
        }
    }
    if !buf.is_empty() && !tx.is_closed() {
        let line = String::from_utf8_lossy(&buf).to_string();
        if tx.send(LogChunk { line }).await.is_ok() {
            sent += 1;
        }
    }
    counter!("vdash_log_lines_total", sent);
    info!(ctx = %ctx, lines = sent, "log pump ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn splits_lines_across_chunks_and_flushes_tail() {
        let (tx, mut rx) = mpsc::channel::<LogChunk>(16);
        let (_cancel, cancel_rx) = CancelHandle::new();
        let chunks = vec![
            Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from_static(b"hello\nwor")),
            Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from_static(b"ld\r\n")),
            Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from_static(b"tail")),
        ];
        pump_bytes_to_lines(stream::iter(chunks), tx, cancel_rx, Some("test")).await;
        let mut out = Vec::new();
        while let Some(c) = rx.recv().await {
            out.push(c.line);
        }
        assert_eq!(out, vec!["hello", "world", "tail"]);
    }

    #[tokio::test]
    async fn stream_error_ends_pump() {
        let (tx, mut rx) = mpsc::channel::<LogChunk>(16);
        let (_cancel, cancel_rx) = CancelHandle::new();
        let chunks = vec![
            Ok(bytes::Bytes::from_static(b"one\n")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
            Ok(bytes::Bytes::from_static(b"never\n")),
        ];
        pump_bytes_to_lines(stream::iter(chunks), tx, cancel_rx, None).await;
        let mut out = Vec::new();
        while let Some(c) = rx.recv().await {
            out.push(c.line);
        }
        assert_eq!(out, vec!["one"]);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_pump() {
        let (tx, rx) = mpsc::channel::<LogChunk>(1);
        let (_cancel, cancel_rx) = CancelHandle::new();
        drop(rx);
        let s = async_stream::stream! {
            loop {
                yield Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from_static(b"line\n"));
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), pump_bytes_to_lines(s, tx, cancel_rx, Some("gone")))
            .await
            .expect("pump did not stop");
    }

    #[tokio::test]
    async fn cancel_stops_pump_quickly() {
        let (tx, mut rx) = mpsc::channel::<LogChunk>(16);
        let (cancel, cancel_rx) = CancelHandle::new();
        // Slow stream: one line every 100ms, forever
        let s = async_stream::stream! {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                yield Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from_static(b"line\n"));
            }
        };
        let handle = tokio::spawn(async move { pump_bytes_to_lines(s, tx, cancel_rx, Some("cancel-test")).await });
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await.expect("pump did not stop");
        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
    }

    #[test]
    fn default_options_follow_with_timestamps() {
        let o = LogOptions::default();
        assert!(o.follow && o.timestamps && o.pretty);
        assert_eq!(o.tail_lines, None);
    }
}
