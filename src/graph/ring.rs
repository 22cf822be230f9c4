use tracing::*;

use super::DGraph;
use crate::{BondType, GraphError, Result, VertexId};

/// A cycle of vertices closed by the chord between its two ring-closing
/// vertices, the head (first) and the tail (last).
///
/// Consecutive vertices are adjacent in the spanning tree of the graph.
/// Distances are counted along this ordered list, not through the rest of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ring {
    vertices: Vec<VertexId>,
    bond: BondType,
}

impl Ring {
    pub fn new(vertices: Vec<VertexId>, bond: BondType) -> Self {
        Self { vertices, bond }
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn size(&self) -> usize {
        self.vertices.len()
    }

    pub fn head(&self) -> Option<VertexId> {
        self.vertices.first().copied()
    }

    pub fn tail(&self) -> Option<VertexId> {
        self.vertices.last().copied()
    }

    /// Bond type of the chord.
    pub fn bond(&self) -> BondType {
        self.bond
    }

    pub fn set_bond(&mut self, bond: BondType) {
        self.bond = bond;
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.vertices.contains(&vertex)
    }

    pub fn position_of(&self, vertex: VertexId) -> Option<usize> {
        self.vertices.iter().position(|v| *v == vertex)
    }

    /// Number of ring edges between `a` and `b` along the ordered path.
    pub fn distance(&self, a: VertexId, b: VertexId) -> Option<usize> {
        let pa = self.position_of(a)?;
        let pb = self.position_of(b)?;
        Some(pa.abs_diff(pb))
    }

    /// Whichever of `a` and `b` is nearer `target`, `a` on ties.
    pub fn closer_to(&self, a: VertexId, b: VertexId, target: VertexId) -> Option<VertexId> {
        let da = self.distance(a, target)?;
        let db = self.distance(b, target)?;
        Some(if da <= db { a } else { b })
    }

    pub fn closer_to_head(&self, a: VertexId, b: VertexId) -> Option<VertexId> {
        self.closer_to(a, b, self.head()?)
    }

    pub fn closer_to_tail(&self, a: VertexId, b: VertexId) -> Option<VertexId> {
        self.closer_to(a, b, self.tail()?)
    }

    /// Splice `vertex` between the adjacent members `a` and `b`.
    pub fn insert_vertex(&mut self, vertex: VertexId, a: VertexId, b: VertexId) -> Result<()> {
        let (Some(pa), Some(pb)) = (self.position_of(a), self.position_of(b)) else {
            return Err(GraphError::structural(format!(
                "vertices {a} and {b} are not both members of the ring"
            )));
        };
        if pa.abs_diff(pb) != 1 {
            return Err(GraphError::structural(format!(
                "vertices {a} and {b} are not adjacent in the ring"
            )));
        }
        if self.contains(vertex) {
            return Err(GraphError::structural(format!(
                "vertex {vertex} is already a ring member"
            )));
        }
        self.vertices.insert(pa.max(pb), vertex);
        Ok(())
    }

    pub(crate) fn replace_vertex(&mut self, old: VertexId, new: VertexId) -> bool {
        match self.position_of(old) {
            Some(p) => {
                self.vertices[p] = new;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remap(&mut self, map: impl Fn(VertexId) -> VertexId) {
        for v in self.vertices.iter_mut() {
            *v = map(*v);
        }
    }
}

impl DGraph {
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    pub fn rings_involving(&self, vertex: VertexId) -> Vec<&Ring> {
        self.rings.iter().filter(|r| r.contains(vertex)).collect()
    }

    pub fn is_vertex_in_ring(&self, vertex: VertexId) -> bool {
        self.rings.iter().any(|r| r.contains(vertex))
    }

    /// Whether `vertex` is the head or tail of some ring.
    pub fn is_ring_endpoint(&self, vertex: VertexId) -> bool {
        self.rings
            .iter()
            .any(|r| r.head() == Some(vertex) || r.tail() == Some(vertex))
    }

    /// Close a ring between two ring-closing leaves.
    ///
    /// The chord takes the bond type of the edge that links `head` to its parent.
    pub fn add_ring(&mut self, head: VertexId, tail: VertexId) -> Result<()> {
        let bond = self
            .edge_to_parent(head)
            .map(|e| e.bond())
            .unwrap_or_default();
        self.add_ring_with_bond(head, tail, bond)
    }

    pub fn add_ring_with_bond(&mut self, head: VertexId, tail: VertexId, bond: BondType) -> Result<()> {
        if head == tail {
            return Err(GraphError::structural("a ring needs two distinct ring-closing vertices"));
        }
        for rcv in [head, tail] {
            let vertex = self.vertex(rcv).ok_or_else(|| {
                GraphError::structural(format!("ring endpoint {rcv} is not in graph {}", self.id))
            })?;
            if !vertex.is_ring_closing() {
                return Err(GraphError::structural(format!(
                    "ring endpoint {rcv} is not a ring-closing vertex"
                )));
            }
            if !self.children_of(rcv).is_empty() {
                return Err(GraphError::structural(format!(
                    "ring endpoint {rcv} is not a leaf"
                )));
            }
            if self.is_ring_endpoint(rcv) {
                return Err(GraphError::structural(format!(
                    "ring-closing vertex {rcv} already closes a ring"
                )));
            }
        }
        let path = self.tree_path(head, tail).ok_or_else(|| {
            GraphError::structural(format!("no path between ring endpoints {head} and {tail}"))
        })?;
        debug!("Adding ring of {} vertices between {} and {}", path.len(), head, tail);
        self.rings.push(Ring::new(path, bond));
        Ok(())
    }

    pub fn remove_ring(&mut self, index: usize) -> Option<Ring> {
        if index < self.rings.len() {
            Some(self.rings.remove(index))
        } else {
            None
        }
    }
}
