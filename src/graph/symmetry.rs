use std::collections::BTreeMap;

use tracing::*;

use super::DGraph;
use crate::{GraphError, Result, VertexId};

/// Vertices of a graph that are edited in lock-step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymmetricSet {
    ids: Vec<VertexId>,
}

impl SymmetricSet {
    /// Build a set from vertex ids; duplicates are dropped, order is kept.
    pub fn new(ids: impl IntoIterator<Item = VertexId>) -> Self {
        let mut unique = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Self { ids: unique }
    }

    pub fn ids(&self) -> &[VertexId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn add(&mut self, id: VertexId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: VertexId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|i| *i != id);
        before != self.ids.len()
    }

    pub(crate) fn remap(&mut self, map: impl Fn(VertexId) -> VertexId) {
        for id in self.ids.iter_mut() {
            *id = map(*id);
        }
    }
}

/// APs of a single vertex, identified by index, that are edited in lock-step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymmetricAps {
    indices: Vec<usize>,
}

impl SymmetricAps {
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut unique: Vec<usize> = Vec::new();
        for i in indices {
            if !unique.contains(&i) {
                unique.push(i);
            }
        }
        Self { indices: unique }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn overlaps(&self, other: &SymmetricAps) -> bool {
        self.indices.iter().any(|i| other.contains(*i))
    }
}

impl DGraph {
    pub fn symmetric_sets(&self) -> &[SymmetricSet] {
        &self.sym_sets
    }

    pub fn symmetric_set_count(&self) -> usize {
        self.sym_sets.len()
    }

    /// The symmetric set `vertex` belongs to, if any.
    pub fn symmetric_set_of(&self, vertex: VertexId) -> Option<&SymmetricSet> {
        self.sym_sets.iter().find(|set| set.contains(vertex))
    }

    /// The vertices edited together with `vertex`, itself included.
    pub fn symmetric_partners(&self, vertex: VertexId) -> Vec<VertexId> {
        match self.symmetric_set_of(vertex) {
            Some(set) => set.ids().to_vec(),
            None => vec![vertex],
        }
    }

    /// Declare a set of vertices as symmetric.
    ///
    /// Members must be vertices of this graph and must not belong to any other
    /// symmetric set.
    pub fn add_symmetric_set(&mut self, ids: impl IntoIterator<Item = VertexId>) -> Result<()> {
        let set = SymmetricSet::new(ids);
        if set.len() < 2 {
            return Err(GraphError::structural("a symmetric set needs at least two vertices"));
        }
        for id in set.ids() {
            if !self.contains_vertex(*id) {
                return Err(GraphError::structural(format!(
                    "symmetric set member {id} is not a vertex of graph {}",
                    self.id
                )));
            }
            if self.symmetric_set_of(*id).is_some() {
                return Err(GraphError::structural(format!(
                    "vertex {id} already belongs to a symmetric set"
                )));
            }
        }
        self.sym_sets.push(set);
        Ok(())
    }

    pub fn remove_symmetric_set(&mut self, index: usize) -> Option<SymmetricSet> {
        if index < self.sym_sets.len() {
            Some(self.sym_sets.remove(index))
        } else {
            None
        }
    }

    /// Drop `vertex` from its symmetric set, dissolving the set when fewer than
    /// two members remain.
    pub(crate) fn drop_from_symmetric_sets(&mut self, vertex: VertexId) {
        for set in self.sym_sets.iter_mut() {
            set.remove(vertex);
        }
        let before = self.sym_sets.len();
        self.sym_sets.retain(|set| set.len() >= 2);
        if before != self.sym_sets.len() {
            debug!("Dissolved symmetric set after removing vertex {}", vertex);
        }
    }

    /// Stamp every vertex with a symmetry label: members of a symmetric set
    /// share one label, every other vertex gets a label of its own.
    pub fn reassign_symmetric_labels(&mut self) {
        let mut label_of: BTreeMap<VertexId, u64> = BTreeMap::new();
        let mut next = 0u64;
        for set in &self.sym_sets {
            for id in set.ids() {
                label_of.insert(*id, next);
            }
            next += 1;
        }
        for vertex in self.vertices.iter_mut() {
            let label = match label_of.get(&vertex.id()) {
                Some(label) => *label,
                None => {
                    next += 1;
                    next - 1
                }
            };
            vertex.set_symmetry_label(Some(label));
        }
    }

    /// Turn shared symmetry labels back into symmetric sets and clear all labels.
    ///
    /// A group of two or more vertices sharing a label joins the symmetric set
    /// one of its members already belongs to, or forms a new one.
    pub fn convert_symmetric_labels_to_symmetric_sets(&mut self) {
        let mut groups: BTreeMap<u64, Vec<VertexId>> = BTreeMap::new();
        for vertex in &self.vertices {
            if let Some(label) = vertex.symmetry_label() {
                groups.entry(label).or_default().push(vertex.id());
            }
        }

        for (label, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let existing = self
                .sym_sets
                .iter()
                .position(|set| members.iter().any(|m| set.contains(*m)));
            match existing {
                Some(index) => {
                    // Members already in some other set stay where they are.
                    let free: Vec<VertexId> = members
                        .iter()
                        .copied()
                        .filter(|m| {
                            self.sym_sets
                                .iter()
                                .enumerate()
                                .all(|(i, set)| i == index || !set.contains(*m))
                        })
                        .collect();
                    for m in free {
                        self.sym_sets[index].add(m);
                    }
                }
                None => {
                    trace!("Symmetry label {} becomes a set of {} vertices", label, members.len());
                    self.sym_sets.push(SymmetricSet::new(members));
                }
            }
        }

        for vertex in self.vertices.iter_mut() {
            vertex.set_symmetry_label(None);
        }
    }
}
