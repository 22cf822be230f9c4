use std::collections::BTreeSet;

use tracing::*;

use super::{ApClass, BBType, BondType, DGraph, Edge, Vertex, VertexKind};
use crate::VertexId;

/// Pattern over edges. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeQuery {
    pub src_vertex: Option<VertexId>,
    pub trg_vertex: Option<VertexId>,
    pub src_ap_index: Option<usize>,
    pub trg_ap_index: Option<usize>,
    pub bond: Option<BondType>,
    pub src_class: Option<ApClass>,
    pub trg_class: Option<ApClass>,
}

impl EdgeQuery {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether `edge`, which belongs to `graph`, fits the pattern.
    pub fn matches(&self, edge: &Edge, graph: &DGraph) -> bool {
        let class_of = |ap| graph.ap(ap).and_then(|ap| ap.class());
        self.src_vertex.map_or(true, |v| v == edge.src_vertex())
            && self.trg_vertex.map_or(true, |v| v == edge.trg_vertex())
            && self.src_ap_index.map_or(true, |i| i == edge.src().index)
            && self.trg_ap_index.map_or(true, |i| i == edge.trg().index)
            && self.bond.map_or(true, |b| b == edge.bond())
            && self
                .src_class
                .as_ref()
                .map_or(true, |c| class_of(edge.src()) == Some(c))
            && self
                .trg_class
                .as_ref()
                .map_or(true, |c| class_of(edge.trg()) == Some(c))
    }
}

/// Pattern over vertices. Unset fields match anything.
///
/// `incoming` must match the edge to the parent of the vertex, `outgoing` at
/// least one of the edges to its children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexQuery {
    pub vertex_id: Option<VertexId>,
    pub kind: Option<VertexKind>,
    pub bb_type: Option<BBType>,
    pub bb_id: Option<usize>,
    /// Distance from the source as given by [`DGraph::level`].
    pub level: Option<i32>,
    pub incoming: Option<EdgeQuery>,
    pub outgoing: Option<EdgeQuery>,
}

impl VertexQuery {
    pub fn matches(&self, vertex: &Vertex, graph: &DGraph) -> bool {
        if !(self.vertex_id.map_or(true, |id| id == vertex.id())
            && self.kind.map_or(true, |k| k == vertex.kind())
            && self.bb_type.map_or(true, |t| t == vertex.bb_type())
            && self.bb_id.map_or(true, |id| id == vertex.building_block().id))
        {
            return false;
        }
        if let Some(level) = self.level {
            if graph.level(vertex.id()) != Some(level) {
                return false;
            }
        }
        if let Some(incoming) = &self.incoming {
            match graph.edge_to_parent(vertex.id()) {
                Some(edge) if incoming.matches(edge, graph) => {}
                _ => return false,
            }
        }
        if let Some(outgoing) = &self.outgoing {
            let any = graph
                .edges()
                .iter()
                .filter(|e| e.src_vertex() == vertex.id())
                .any(|e| outgoing.matches(e, graph));
            if !any {
                return false;
            }
        }
        true
    }
}

impl DGraph {
    /// Vertices matching `query`, in graph order.
    ///
    /// With `purge_symmetry`, only the first matching member of each
    /// symmetric set is kept.
    pub fn find_vertices(&self, query: &VertexQuery, purge_symmetry: bool) -> Vec<VertexId> {
        let mut found: Vec<VertexId> = self
            .vertices
            .iter()
            .filter(|v| query.matches(v, self))
            .map(Vertex::id)
            .collect();
        trace!("Query {:?} matched {:?} in graph {}", query, found, self.id);

        if purge_symmetry {
            let mut represented = BTreeSet::new();
            found.retain(|id| match self.symmetric_set_of(*id) {
                Some(set) => represented.insert(set.ids()[0]),
                None => true,
            });
            debug!("{} vertices left after purging symmetric duplicates", found.len());
        }
        found
    }

    /// Edges matching `query`, in graph order.
    pub fn find_edges(&self, query: &EdgeQuery) -> Vec<&Edge> {
        let found: Vec<&Edge> = self.edges.iter().filter(|e| query.matches(e, self)).collect();
        trace!("Edge query matched {} edges in graph {}", found.len(), self.id);
        found
    }
}
