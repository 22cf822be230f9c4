use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::*;

use super::{ApRef, ApRenames, BondType, ChildrenTreeLimits, DGraph, Ring, Vertex};
use crate::library::{ApCompatibility, BuildingBlockLibrary};
use crate::{BuildingBlockRef, GraphError, IdCounters, Result, VertexId};

/// What a subgraph replacement did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgraphReplacement {
    /// Ids of the vertices brought in.
    pub added: Vec<VertexId>,
    /// Free APs of the replaced region that now live on the incoming vertices.
    /// A template wrapping the edited graph uses them to keep its outer APs.
    pub renames: ApRenames,
}

/// An edge crossing the border of a region that must be rebuilt on the
/// incoming subgraph.
#[derive(Debug, Clone, Copy)]
struct Relink {
    external: ApRef,
    incoming: ApRef,
    bond: BondType,
    external_is_parent: bool,
}

impl DGraph {
    /// A copy of `seed` and all of its descendants.
    ///
    /// Rings entirely inside the copied branch are kept, others are dropped and
    /// their ring-closing vertices stay as plain leaves. Symmetric sets are
    /// restricted to the copied vertices and dropped if fewer than two remain.
    pub fn extract_subgraph(&self, seed: VertexId, ids: &IdCounters) -> Result<DGraph> {
        if !self.contains_vertex(seed) {
            return Err(GraphError::structural(format!(
                "no vertex {seed} in graph {}",
                self.id
            )));
        }
        let mut members: BTreeSet<VertexId> = self
            .children_tree(seed, ChildrenTreeLimits::default())
            .into_iter()
            .collect();
        members.insert(seed);

        let mut sub = DGraph::new(ids);
        for vertex in self.vertices.iter().filter(|v| members.contains(&v.id())) {
            let mut copy = vertex.clone();
            copy.detach_all_aps();
            copy.set_symmetry_label(None);
            sub.add_vertex(copy)?;
        }
        for edge in self
            .edges
            .iter()
            .filter(|e| members.contains(&e.src_vertex()) && members.contains(&e.trg_vertex()))
        {
            sub.add_edge(edge.src(), edge.trg(), edge.bond())?;
        }
        for ring in &self.rings {
            if ring.vertices().iter().all(|v| members.contains(v)) {
                sub.rings.push(ring.clone());
            } else if ring.vertices().iter().any(|v| members.contains(v)) {
                debug!("Ring {:?} is only partly inside the extracted branch", ring.vertices());
            }
        }
        for set in &self.sym_sets {
            let kept: Vec<VertexId> = set
                .ids()
                .iter()
                .copied()
                .filter(|v| members.contains(v))
                .collect();
            if kept.len() >= 2 {
                sub.add_symmetric_set(kept)?;
            }
        }
        debug!(
            "Extracted {} vertices from graph {} starting at {}",
            sub.vertex_count(),
            self.id,
            seed
        );
        Ok(sub)
    }

    /// Replace a connected region of this graph with `incoming`.
    ///
    /// `ap_map` maps APs of the region to APs of `incoming`. Every AP of the
    /// region used by an edge that leaves the region must be mapped to a free
    /// AP of `incoming`, with a class that `compatibility` accepts on that
    /// edge. The region is removed, `incoming` is added, and every edge that
    /// crossed the border is rebuilt on the mapped AP with its bond type.
    ///
    /// Rings running through the region are re-routed through `incoming`. A
    /// ring whose head or tail lies in the region survives when one of the APs
    /// of that endpoint maps to a ring-closing vertex of `incoming`, which
    /// becomes the new endpoint.
    ///
    /// Nothing changes when the replacement fails.
    pub fn replace_single_subgraph(
        &mut self,
        to_replace: &[VertexId],
        incoming: DGraph,
        ap_map: &BTreeMap<ApRef, ApRef>,
        compatibility: &dyn ApCompatibility,
    ) -> Result<SubgraphReplacement> {
        let region: BTreeSet<VertexId> = to_replace.iter().copied().collect();
        if region.is_empty() {
            return Err(GraphError::invalid_edit("nothing to replace"));
        }
        if incoming.is_empty() {
            return Err(GraphError::invalid_edit("the incoming subgraph is empty"));
        }
        if let Some(missing) = region.iter().find(|v| !self.contains_vertex(**v)) {
            return Err(GraphError::structural(format!(
                "no vertex {missing} in graph {}",
                self.id
            )));
        }
        self.check_connected(&region)?;
        if let Some(clash) = incoming
            .vertices
            .iter()
            .map(Vertex::id)
            .find(|id| self.contains_vertex(*id) && !region.contains(id))
        {
            return Err(GraphError::invalid_edit(format!(
                "incoming vertex id {clash} is already used in graph {}",
                self.id
            )));
        }

        // Find the border edges and where they land on the incoming subgraph
        let region_in_order: Vec<VertexId> = self
            .vertices
            .iter()
            .map(Vertex::id)
            .filter(|id| region.contains(id))
            .collect();
        let mut relinks = Vec::new();
        let mut claimed = BTreeSet::new();
        for edge in &self.edges {
            let src_inside = region.contains(&edge.src_vertex());
            let trg_inside = region.contains(&edge.trg_vertex());
            if src_inside == trg_inside {
                continue;
            }
            let (inside, external) = if trg_inside {
                (edge.trg(), edge.src())
            } else {
                (edge.src(), edge.trg())
            };
            let mapped = *ap_map.get(&inside).ok_or_else(|| {
                GraphError::invalid_edit(format!("interface {inside} has no counterpart in the incoming subgraph"))
            })?;
            let incoming_ap = incoming.ap(mapped).ok_or_else(|| {
                GraphError::invalid_edit(format!("{inside} is mapped to {mapped}, which does not exist"))
            })?;
            if !incoming_ap.is_available() {
                return Err(GraphError::invalid_edit(format!(
                    "{inside} is mapped to {mapped}, which is already in use"
                )));
            }
            if !claimed.insert(mapped) {
                return Err(GraphError::invalid_edit(format!(
                    "{mapped} is the target of more than one interface AP"
                )));
            }
            let external_class = self.ap(external).and_then(|ap| ap.class());
            let compatible = if trg_inside {
                compatibility.is_compatible(external_class, incoming_ap.class())
            } else {
                compatibility.is_compatible(incoming_ap.class(), external_class)
            };
            if !compatible {
                return Err(GraphError::invalid_edit(format!(
                    "{mapped} ({:?}) cannot replace {inside} on the link to {external} ({:?})",
                    incoming_ap.class(),
                    external_class
                )));
            }
            trace!("Border edge {} will land on {}", edge, mapped);
            relinks.push(Relink {
                external,
                incoming: mapped,
                bond: edge.bond(),
                external_is_parent: trg_inside,
            });
        }

        let mut renames = Vec::new();
        for id in &region_in_order {
            let Some(vertex) = self.vertex(*id) else {
                continue;
            };
            for index in vertex.free_ap_indices() {
                let old = ApRef::new(*id, index);
                if let Some(new) = ap_map.get(&old) {
                    let usable = incoming.ap(*new).map(|ap| ap.is_available()).unwrap_or(false);
                    if usable && !claimed.contains(new) {
                        renames.push((old, *new));
                    }
                }
            }
        }

        // Rings through the region keep their endpoints, or move them onto
        // ring-closing vertices of the incoming subgraph
        let mut rerouted = Vec::new();
        for ring in &self.rings {
            if !ring.vertices().iter().any(|v| region.contains(v)) {
                continue;
            }
            if ring.vertices().iter().all(|v| region.contains(v)) {
                debug!("Ring {:?} is replaced along with its region", ring.vertices());
                continue;
            }
            let head = ring
                .head()
                .and_then(|v| self.ring_end_after_replacement(v, &region, ap_map, &incoming));
            let tail = ring
                .tail()
                .and_then(|v| self.ring_end_after_replacement(v, &region, ap_map, &incoming));
            match (head, tail) {
                (Some(head), Some(tail)) => rerouted.push((head, tail, ring.bond())),
                _ => debug!("Ring {:?} loses an endpoint and is dropped", ring.vertices()),
            }
        }

        let mut work = self.clone();
        work.rings
            .retain(|ring| !ring.vertices().iter().any(|v| region.contains(v)));
        for id in &region_in_order {
            work.remove_vertex(*id)?;
        }
        let added = incoming.vertex_ids();
        work.absorb(incoming)?;
        for relink in &relinks {
            if relink.external_is_parent {
                work.add_edge(relink.external, relink.incoming, relink.bond)?;
            } else {
                work.add_edge(relink.incoming, relink.external, relink.bond)?;
            }
        }
        for (head, tail, bond) in rerouted {
            match work.tree_path(head, tail) {
                Some(path) => work.rings.push(Ring::new(path, bond)),
                None => warn!("No path between {} and {} after replacement, ring dropped", head, tail),
            }
        }

        debug!(
            "Replaced {} vertices of graph {} with {} incoming vertices",
            region.len(),
            self.id,
            added.len()
        );
        *self = work;
        Ok(SubgraphReplacement { added, renames })
    }

    /// Swap `vertex` for a new vertex built from `bb`.
    ///
    /// `ap_index_map` sends AP indices of the old vertex to AP indices of the
    /// new one and must cover every AP of the old vertex that is in use. Edges,
    /// ring endpoints and symmetric-set membership move to the new vertex.
    /// With `symmetric`, every member of the symmetric set of `vertex` is
    /// replaced the same way.
    pub fn replace_vertex(
        &mut self,
        vertex: VertexId,
        bb: BuildingBlockRef,
        ap_index_map: &BTreeMap<usize, usize>,
        library: &dyn BuildingBlockLibrary,
        ids: &IdCounters,
        symmetric: bool,
    ) -> Result<SubgraphReplacement> {
        if !self.contains_vertex(vertex) {
            return Err(GraphError::structural(format!(
                "no vertex {vertex} in graph {}",
                self.id
            )));
        }
        let targets = if symmetric {
            self.symmetric_partners(vertex)
        } else {
            vec![vertex]
        };

        let mut work = self.clone();
        work.reassign_symmetric_labels();
        let mut report = SubgraphReplacement::default();
        for target in targets {
            let old = work
                .vertex(target)
                .ok_or_else(|| GraphError::structural(format!("no vertex {target} in graph {}", self.id)))?;
            if let Some(unmapped) = old
                .used_ap_indices()
                .into_iter()
                .find(|i| !ap_index_map.contains_key(i))
            {
                return Err(GraphError::invalid_edit(format!(
                    "AP {unmapped} of vertex {target} is in use but not mapped"
                )));
            }

            let mut replacement = library.make_vertex(bb, ids.unique_vertex_index(), ids)?;
            replacement.set_symmetry_label(old.symmetry_label());
            let mut map = BTreeMap::new();
            for (old_index, new_index) in ap_index_map {
                if *old_index >= old.ap_count() || *new_index >= replacement.ap_count() {
                    return Err(GraphError::invalid_edit(format!(
                        "AP mapping {old_index} -> {new_index} is out of range"
                    )));
                }
                map.insert(
                    ApRef::new(target, *old_index),
                    ApRef::new(replacement.id(), *new_index),
                );
            }
            debug!("Replacing vertex {} with {} from {:?}", target, replacement.id(), bb);

            let mut incoming = DGraph::new(ids);
            incoming.add_vertex(replacement)?;
            let step = work.replace_single_subgraph(&[target], incoming, &map, library.compatibility())?;
            report.added.extend(step.added);
            report.renames.extend(step.renames);
        }
        work.convert_symmetric_labels_to_symmetric_sets();
        *self = work;
        Ok(report)
    }

    /// The endpoint a ring should have once `region` is replaced.
    fn ring_end_after_replacement(
        &self,
        end: VertexId,
        region: &BTreeSet<VertexId>,
        ap_map: &BTreeMap<ApRef, ApRef>,
        incoming: &DGraph,
    ) -> Option<VertexId> {
        if !region.contains(&end) {
            return Some(end);
        }
        let vertex = self.vertex(end)?;
        (0..vertex.ap_count())
            .filter_map(|i| ap_map.get(&ApRef::new(end, i)))
            .map(|ap| ap.vertex)
            .find(|v| incoming.vertex(*v).map(Vertex::is_ring_closing).unwrap_or(false))
    }

    /// Fail unless the tree edges among `region` connect all of it.
    fn check_connected(&self, region: &BTreeSet<VertexId>) -> Result<()> {
        let Some(start) = region.iter().next().copied() else {
            return Ok(());
        };
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for edge in self.edges_of(current) {
                let other = if edge.src_vertex() == current {
                    edge.trg_vertex()
                } else {
                    edge.src_vertex()
                };
                if region.contains(&other) && seen.insert(other) {
                    queue.push_back(other);
                }
            }
        }
        if seen.len() != region.len() {
            return Err(GraphError::invalid_edit(format!(
                "the {} vertices to replace span more than one connected component",
                region.len()
            )));
        }
        Ok(())
    }

    /// Move every vertex, edge, ring and symmetric set of `other` into this graph.
    fn absorb(&mut self, other: DGraph) -> Result<()> {
        let DGraph {
            vertices,
            edges,
            rings,
            sym_sets,
            ..
        } = other;
        for mut vertex in vertices {
            vertex.detach_all_aps();
            self.add_vertex(vertex)?;
        }
        for edge in edges {
            self.add_edge(edge.src(), edge.trg(), edge.bond())?;
        }
        self.rings.extend(rings);
        for set in sym_sets {
            self.add_symmetric_set(set.ids().to_vec())?;
        }
        Ok(())
    }
}
