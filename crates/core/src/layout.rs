//! Layout engine contract plus a small built-in layered layout.
//!
//! Layout is the one asynchronous step in the graph pipeline. Callers go
//! through [`LayoutSession`] so that a result computed for a superseded
//! request is discarded instead of overwriting newer positions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Graph, Position, Size};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Down,
    Up,
    Right,
    Left,
}

impl std::str::FromStr for Direction {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOWN" => Ok(Direction::Down),
            "UP" => Ok(Direction::Up),
            "RIGHT" => Ok(Direction::Right),
            "LEFT" => Ok(Direction::Left),
            _ => Err(LayoutError::InvalidOption(format!("direction: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    pub algorithm: String,
    pub direction: Direction,
    /// Gap between neighbours in the same layer.
    pub node_spacing: f64,
    /// Gap between consecutive layers.
    pub layer_spacing: f64,
    /// Size assumed for nodes the client has not measured.
    pub default_size: Size,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            algorithm: "layered".to_string(),
            direction: Direction::Down,
            node_spacing: 80.0,
            layer_spacing: 100.0,
            default_size: Size { width: 180.0, height: 60.0 },
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("stale layout: ticket {ticket} superseded by {latest}")]
    Stale { ticket: u64, latest: u64 },
    #[error("engine: {0}")]
    Engine(String),
}

/// Positions the nodes of a graph. Edges and node payloads are left untouched.
#[async_trait::async_trait]
pub trait LayoutEngine: Send + Sync {
    async fn layout(&self, graph: Graph, opts: &LayoutOptions) -> Result<Graph, LayoutError>;
}

/// Layered layout: a node's layer is the longest path reaching it from a root.
/// Nodes within a layer keep their input order. Cycles are broken by the
/// order in which nodes are visited.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredLayout;

impl LayeredLayout {
    pub fn compute(&self, graph: &mut Graph, opts: &LayoutOptions) -> Result<(), LayoutError> {
        if opts.algorithm != "layered" {
            return Err(LayoutError::UnsupportedAlgorithm(opts.algorithm.clone()));
        }
        let n = graph.nodes.len();
        let index: HashMap<&str, usize> = graph.nodes.iter().enumerate().map(|(i, nd)| (nd.id.as_str(), i)).collect();
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indeg = vec![0usize; n];
        let mut pairs = Vec::with_capacity(graph.edges.len());
        for e in &graph.edges {
            if let (Some(&s), Some(&t)) = (index.get(e.source.as_str()), index.get(e.target.as_str())) {
                out[s].push(t);
                indeg[t] += 1;
                pairs.push((s, t));
            }
        }

        // Kahn order, then whatever a cycle left behind in input order.
        let mut order = Vec::with_capacity(n);
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
        let mut remaining = indeg.clone();
        let mut seen = vec![false; n];
        while let Some(u) = queue.pop_front() {
            seen[u] = true;
            order.push(u);
            for &v in &out[u] {
                remaining[v] -= 1;
                if remaining[v] == 0 {
                    queue.push_back(v);
                }
            }
        }
        order.extend((0..n).filter(|&i| !seen[i]));
        let mut pos = vec![0usize; n];
        for (k, &i) in order.iter().enumerate() {
            pos[i] = k;
        }

        let mut rank = vec![0usize; n];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(s, t) in &pairs {
            if pos[s] < pos[t] {
                incoming[t].push(s);
            }
        }
        for &i in &order {
            rank[i] = incoming[i].iter().map(|&s| rank[s] + 1).max().unwrap_or(0);
        }

        let size_of = |i: usize| graph.nodes[i].measured.unwrap_or(opts.default_size);
        let layers = rank.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut thickness = vec![0f64; layers];
        for i in 0..n {
            let s = size_of(i);
            let t = match opts.direction {
                Direction::Down | Direction::Up => s.height,
                Direction::Right | Direction::Left => s.width,
            };
            thickness[rank[i]] = thickness[rank[i]].max(t);
        }
        let mut main_offset = vec![0f64; layers];
        for l in 1..layers {
            main_offset[l] = main_offset[l - 1] + thickness[l - 1] + opts.layer_spacing;
        }

        let mut cursor = vec![0f64; layers];
        let mut placed = Vec::with_capacity(n);
        for i in 0..n {
            let s = size_of(i);
            let l = rank[i];
            let main = main_offset[l];
            let cross = cursor[l];
            let (x, y, advance) = match opts.direction {
                Direction::Down => (cross, main, s.width),
                Direction::Up => (cross, -main, s.width),
                Direction::Right => (main, cross, s.height),
                Direction::Left => (-main, cross, s.height),
            };
            cursor[l] += advance + opts.node_spacing;
            placed.push(Position { x, y });
        }
        for (nd, p) in graph.nodes.iter_mut().zip(placed) {
            nd.position = p;
        }
        debug!(nodes = n, layers, "layered layout computed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl LayoutEngine for LayeredLayout {
    async fn layout(&self, mut graph: Graph, opts: &LayoutOptions) -> Result<Graph, LayoutError> {
        self.compute(&mut graph, opts)?;
        Ok(graph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTicket(u64);

impl LayoutTicket {
    pub fn version(self) -> u64 {
        self.0
    }
}

/// Issues versioned layout requests and rejects results of superseded ones.
#[derive(Debug, Default)]
pub struct LayoutSession {
    latest: AtomicU64,
}

impl LayoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request; every earlier ticket becomes stale.
    pub fn ticket(&self) -> LayoutTicket {
        LayoutTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Accept a finished layout only if no newer request was issued meanwhile.
    pub fn accept(&self, ticket: LayoutTicket, graph: Graph) -> Result<Graph, LayoutError> {
        let latest = self.latest();
        if ticket.0 == latest {
            Ok(graph)
        } else {
            Err(LayoutError::Stale { ticket: ticket.0, latest })
        }
    }

    /// Take a ticket, run the engine, and accept the result.
    pub async fn run(&self, engine: &dyn LayoutEngine, graph: Graph, opts: &LayoutOptions) -> Result<Graph, LayoutError> {
        let ticket = self.ticket();
        let laid = engine.layout(graph, opts).await?;
        self.accept(ticket, laid)
    }
}
