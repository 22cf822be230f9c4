use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use tracing::*;

use crate::{GraphError, Result};

/// Identifier of a vertex. Unique across all graphs built from one [`IdCounters`].
pub type VertexId = u64;
/// Identifier of a graph.
pub type GraphId = u64;

lazy_static! {
    static ref GLOBAL_COUNTERS: IdCounters = IdCounters::new();
}

/// Monotonic issuers of vertex and graph ids.
///
/// Both counters can only move forward. `unique_*` returns the current value and
/// then advances the counter, so two concurrent callers never receive the same id.
/// Resetting to a value that is not strictly greater than the current one fails
/// with [`GraphError::CounterRegression`].
///
/// Counters are an explicit service so that independent tests (or independent
/// runs in one process) can use their own. [`IdCounters::global`] exists for
/// callers that want a process-wide instance.
#[derive(Debug)]
pub struct IdCounters {
    vertex: AtomicU64,
    graph: AtomicU64,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl IdCounters {
    /// Counters that start issuing ids from 1.
    pub fn new() -> Self {
        Self::starting_at(1, 1)
    }

    pub fn starting_at(vertex: u64, graph: u64) -> Self {
        Self {
            vertex: AtomicU64::new(vertex),
            graph: AtomicU64::new(graph),
        }
    }

    /// The process-wide counters.
    pub fn global() -> &'static IdCounters {
        &GLOBAL_COUNTERS
    }

    /// Get a fresh vertex id.
    pub fn unique_vertex_index(&self) -> VertexId {
        self.vertex.fetch_add(1, Ordering::SeqCst)
    }

    /// Get a fresh graph id.
    pub fn unique_graph_index(&self) -> GraphId {
        self.graph.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next call to [`IdCounters::unique_vertex_index`] will return.
    pub fn current_vertex_index(&self) -> VertexId {
        self.vertex.load(Ordering::SeqCst)
    }

    pub fn current_graph_index(&self) -> GraphId {
        self.graph.load(Ordering::SeqCst)
    }

    /// Move the vertex counter forward to `value`.
    pub fn reset_vertex_counter(&self, value: u64) -> Result<()> {
        advance(&self.vertex, value, "vertex")
    }

    /// Move the graph counter forward to `value`.
    pub fn reset_graph_counter(&self, value: u64) -> Result<()> {
        advance(&self.graph, value, "graph")
    }

    /// Make sure the vertex counter will never hand out `max_used` or anything below it.
    /// Used after importing graphs whose ids were issued elsewhere.
    pub fn ensure_vertex_ids_above(&self, max_used: VertexId) -> Result<()> {
        fast_forward(&self.vertex, max_used, "vertex")
    }

    pub fn ensure_graph_ids_above(&self, max_used: GraphId) -> Result<()> {
        fast_forward(&self.graph, max_used, "graph")
    }
}

fn fast_forward(counter: &AtomicU64, max_used: u64, name: &'static str) -> Result<()> {
    let next = max_used
        .checked_add(1)
        .ok_or(GraphError::IdsExhausted { counter: name, max_used })?;
    let previous = counter.fetch_max(next, Ordering::SeqCst);
    if previous < next {
        debug!("{} counter fast-forwarded from {} to {}", name, previous, next);
    }
    Ok(())
}

fn advance(counter: &AtomicU64, value: u64, name: &'static str) -> Result<()> {
    let mut current = counter.load(Ordering::SeqCst);
    loop {
        if value <= current {
            return Err(GraphError::CounterRegression {
                counter: name,
                requested: value,
                current,
            });
        }
        match counter.compare_exchange(current, value, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return Ok(()),
            Err(actual) => current = actual,
        }
    }
}
