//! Volcano dashboard core types and transformations.
//!
//! Everything in this crate is pure: raw Kubernetes JSON goes in, the composed
//! queue/job/task/pod hierarchy and its renderable graph come out. Fetching is
//! the job of `vdash-kubehub`; serving is the job of `vdash-api`.

#![forbid(unsafe_code)]

pub mod filter;
pub mod graph;
pub mod hierarchy;
pub mod layout;
pub mod model;
pub mod selection;
pub mod state;

pub use graph::{project, Edge, Graph, IdStrategy, Node, NodeData, NodeKind, NodePayload, Position, Size};
pub use hierarchy::{compose, Hierarchy, JobNode, PodSummary, QueueNode};
pub use layout::{Direction, LayeredLayout, LayoutEngine, LayoutError, LayoutOptions, LayoutSession, LayoutTicket};
pub use model::{Job, Pod, Queue, Task, TaskKey};
pub use selection::{reconcile, selected, SelectionEvent};
pub use state::resolve_job_state;

pub mod prelude {
    pub use super::{
        compose, project, reconcile, Graph, Hierarchy, IdStrategy, Job, LayoutEngine, LayoutOptions, Node, Pod, Queue,
        SelectionEvent, Task, TaskKey,
    };
}

/// 64-bit FNV-1a over a string; used for content-derived node ids.
pub(crate) fn fnv1a(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325; // 64-bit FNV-1a offset
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
