use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use vdash_api::{build_router, ApiState};
use vdash_core::selection::reselect;
use vdash_core::{
    project, reconcile, Direction, IdStrategy, LayeredLayout, LayoutError, LayoutOptions, LayoutSession, Node,
    SelectionEvent,
};
use vdash_kubehub::{load_hierarchy, verify_volcano, KubeSource};
use vdash_ops::KubeLogs;

mod render;

#[derive(Parser, Debug)]
#[command(name = "vdashctl", version, about = "Volcano dashboard backend and CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubeconfig context (default: current context)
    #[arg(long = "context", env = "VDASH_KUBE_CONTEXT", global = true)]
    context: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long = "metrics-addr", env = "VDASH_METRICS_ADDR", global = true)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the dashboard REST/SSE API
    Serve {
        #[arg(long = "port", env = "PORT", default_value_t = 3001)]
        port: u16,
        #[arg(long = "bind", env = "VDASH_BIND", default_value = "0.0.0.0")]
        bind: String,
        /// Buffered log lines per stream before the reader applies backpressure
        #[arg(long = "log-queue-cap", env = "VDASH_LOG_QUEUE_CAP", default_value_t = vdash_ops::DEFAULT_QUEUE_CAP)]
        log_queue_cap: usize,
    },
    /// Print the queue → job → task → pod hierarchy
    Tree,
    /// Project the hierarchy to a laid out graph
    Graph {
        /// Content-derived node ids (stable across refreshes)
        #[arg(long = "stable", action = ArgAction::SetTrue)]
        stable: bool,
        /// Layout direction: DOWN, UP, RIGHT or LEFT
        #[arg(long = "direction", default_value = "DOWN")]
        direction: String,
        /// Select the first node with this label
        #[arg(long = "select")]
        select: Option<String>,
        /// Refresh every N seconds, keeping the selection
        #[arg(long = "watch")]
        watch: Option<u64>,
    },
    /// Check that the Volcano job CRD is reachable
    Verify,
}

const LOG_ENV: &str = "VDASH_LOG";

/// Logs go to stderr so `-o json` output on stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing Prometheus exporter on {addr}"))?;
    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

fn select_by_label(nodes: &mut [Node], label: &str) -> Option<String> {
    let id = nodes.iter().find(|n| n.data.payload.label() == label).map(|n| n.id.clone());
    match id {
        Some(id) => reconcile(nodes, &SelectionEvent::Activate(id)),
        None => {
            warn!(label, "no node with that label");
            None
        }
    }
}

async fn serve(context: Option<&str>, bind: &str, port: u16, log_queue_cap: usize) -> Result<()> {
    let client = vdash_kubehub::connect(context).await?;
    let source = Arc::new(KubeSource::new(client.clone()));
    let logs = Arc::new(KubeLogs::new(client, log_queue_cap));
    let addr: SocketAddr = format!("{bind}:{port}").parse().with_context(|| format!("invalid bind address {bind}:{port}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    if verify_volcano(source.as_ref()).await {
        info!(port, "Server running with Volcano support");
    } else {
        error!(port, "Server started but Volcano support is not available");
    }

    let app = build_router(ApiState::new(source, logs));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("serving api")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            warn!(error = %format!("{e:#}"), "metrics exporter disabled");
        }
    }
    let context = cli.context.as_deref();

    match cli.command {
        Commands::Serve { port, bind, log_queue_cap } => {
            info!(%bind, port, log_queue_cap, "serve invoked");
            serve(context, &bind, port, log_queue_cap).await?;
        }
        Commands::Tree => {
            let source = KubeSource::connect(context).await?;
            let h = load_hierarchy(&source).await.context("loading hierarchy")?;
            match cli.output {
                Output::Human => println!("{}", render::tree(&h, chrono::Utc::now())),
                Output::Json => println!("{}", serde_json::to_string_pretty(&h)?),
            }
        }
        Commands::Graph { stable, direction, select, watch } => {
            let source = KubeSource::connect(context).await?;
            let opts = LayoutOptions { direction: direction.parse::<Direction>()?, ..LayoutOptions::default() };
            // Watching re-projects every tick, so ids must survive a refresh.
            let ids = if stable || watch.is_some() { IdStrategy::Stable } else { IdStrategy::Fresh };
            let session = LayoutSession::new();
            let mut current: Option<String> = None;
            loop {
                let h = load_hierarchy(&source).await.context("loading hierarchy")?;
                let mut graph = project(&h, ids);
                current = reselect(&mut graph.nodes, current.as_deref())
                    .or_else(|| select.as_deref().and_then(|l| select_by_label(&mut graph.nodes, l)));
                match session.run(&LayeredLayout, graph, &opts).await {
                    Ok(g) => match cli.output {
                        Output::Human => println!("{}", render::graph(&g)),
                        Output::Json => println!("{}", serde_json::to_string(&g)?),
                    },
                    Err(LayoutError::Stale { ticket, latest }) => debug!(ticket, latest, "stale layout discarded"),
                    Err(e) => return Err(e.into()),
                }
                let Some(secs) = watch else { break };
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs.max(1))) => {}
                    _ = signal::ctrl_c() => break,
                }
            }
        }
        Commands::Verify => {
            let source = KubeSource::connect(context).await?;
            if verify_volcano(&source).await {
                println!("volcano: ok");
            } else {
                anyhow::bail!("volcano job CRD (batch.volcano.sh/v1alpha1) is not reachable");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_and_global_flags() {
        let cli = Cli::try_parse_from(["vdashctl", "serve", "--metrics-addr", "127.0.0.1:9100", "-o", "json"])
            .expect("parse");
        assert_eq!(cli.output, Output::Json);
        assert_eq!(cli.metrics_addr, Some("127.0.0.1:9100".parse().expect("addr")));
        match cli.command {
            Commands::Serve { log_queue_cap, .. } => assert_eq!(log_queue_cap, vdash_ops::DEFAULT_QUEUE_CAP),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_metrics_addr() {
        assert!(Cli::try_parse_from(["vdashctl", "verify", "--metrics-addr", "nine-one-hundred"]).is_err());
    }
}
