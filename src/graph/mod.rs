mod ap;
mod edge;
mod edit;
mod query;
mod ring;
mod symmetry;
mod template;
mod vertex;

pub use ap::*;
pub use edge::*;
pub use edit::*;
pub use query::*;
pub use ring::*;
pub use symmetry::*;
pub use template::*;
pub use vertex::*;

use std::collections::{BTreeMap, BTreeSet};

use tracing::*;

use crate::{GraphError, GraphId, IdCounters, Randomizer, Result, VertexId};

/// Limits applied when collecting the descendants of a vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildrenTreeLimits {
    /// Deepest generation to collect, direct children being generation 1.
    pub max_depth: Option<usize>,
    /// A vertex with more children than this is collected but not explored.
    pub branching_threshold: Option<usize>,
    /// Leave ring-closing vertices out.
    pub stop_before_rcvs: bool,
}

/// A graph of building blocks.
///
/// Edges, when ring chords are left aside, form a tree rooted at the source
/// vertex: every other vertex is the target of exactly one edge, the edge to
/// its parent. Ring chords are recorded in the ring list.
///
/// A graph nested in a template remembers the id of that template vertex
/// (its "jacket"). The template owns the graph; the back-reference is only an id.
#[derive(Debug, Clone)]
pub struct DGraph {
    id: GraphId,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    rings: Vec<Ring>,
    sym_sets: Vec<SymmetricSet>,
    jacket: Option<VertexId>,
    next_edge_id: EdgeId,
}

impl DGraph {
    /// An empty graph with a fresh id.
    pub fn new(ids: &IdCounters) -> Self {
        Self::with_id(ids.unique_graph_index())
    }

    pub fn with_id(id: GraphId) -> Self {
        Self {
            id,
            vertices: Vec::new(),
            edges: Vec::new(),
            rings: Vec::new(),
            sym_sets: Vec::new(),
            jacket: None,
            next_edge_id: 1,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn set_id(&mut self, id: GraphId) {
        self.id = id;
    }

    /// Id of the template vertex this graph is nested in.
    pub fn jacket(&self) -> Option<VertexId> {
        self.jacket
    }

    pub(crate) fn set_jacket(&mut self, jacket: Option<VertexId>) {
        self.jacket = jacket;
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices.iter().map(Vertex::id).collect()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.id() == id)
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.iter_mut().find(|v| v.id() == id)
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.iter().any(|v| v.id() == id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id() == id)
    }

    pub fn ap(&self, ap: ApRef) -> Option<&AttachmentPoint> {
        self.vertex(ap.vertex)?.ap(ap.index)
    }

    /// The edge using `ap`, if any.
    pub fn edge_using(&self, ap: ApRef) -> Option<&Edge> {
        let user = self.ap(ap)?.user()?;
        self.edge(user)
    }

    /// The AP at the other end of the edge using `ap`, looking only at this graph.
    pub fn linked_ap(&self, ap: ApRef) -> Option<ApRef> {
        self.edge_using(ap)?.other_end(ap)
    }

    pub fn edges_of(&self, vertex: VertexId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.involves(vertex)).collect()
    }

    pub fn edge_to_parent(&self, vertex: VertexId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.trg_vertex() == vertex)
    }

    pub fn parent_of(&self, vertex: VertexId) -> Option<VertexId> {
        self.edge_to_parent(vertex).map(Edge::src_vertex)
    }

    pub fn children_of(&self, vertex: VertexId) -> Vec<VertexId> {
        self.edges
            .iter()
            .filter(|e| e.src_vertex() == vertex)
            .map(Edge::trg_vertex)
            .collect()
    }

    /// Every available AP of the vertices of this graph.
    pub fn free_aps(&self) -> Vec<ApRef> {
        self.vertices
            .iter()
            .flat_map(|v| v.free_ap_indices().into_iter().map(move |i| v.ap_ref(i)))
            .collect()
    }

    /// Add a vertex whose APs are all available.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<()> {
        if self.contains_vertex(vertex.id()) {
            return Err(GraphError::structural(format!(
                "graph {} already contains a vertex with id {}",
                self.id,
                vertex.id()
            )));
        }
        if vertex.free_ap_count() != vertex.ap_count() {
            return Err(GraphError::structural(format!(
                "vertex {} has APs bound to edges of another graph",
                vertex.id()
            )));
        }
        trace!("Adding vertex {} to graph {}", vertex.id(), self.id);
        self.vertices.push(vertex);
        Ok(())
    }

    /// Connect two available APs. `src` is on the parent vertex.
    pub fn add_edge(&mut self, src: ApRef, trg: ApRef, bond: BondType) -> Result<EdgeId> {
        if src.vertex == trg.vertex {
            return Err(GraphError::structural(format!(
                "cannot link vertex {} to itself",
                src.vertex
            )));
        }
        for end in [src, trg] {
            let ap = self.ap(end).ok_or_else(|| {
                GraphError::structural(format!("{end} does not exist in graph {}", self.id))
            })?;
            if !ap.is_available() {
                return Err(GraphError::structural(format!("{end} is already in use")));
            }
        }
        if let Some(parent) = self.parent_of(trg.vertex) {
            return Err(GraphError::structural(format!(
                "vertex {} already has parent {parent}",
                trg.vertex
            )));
        }
        if self.ancestors(src.vertex).contains(&trg.vertex) {
            return Err(GraphError::structural(format!(
                "linking {src} to {trg} would close a cycle outside of the ring list"
            )));
        }

        let id = self.next_edge_id;
        self.next_edge_id += 1;
        for end in [src, trg] {
            if let Some(ap) = self.vertex_mut(end.vertex).and_then(|v| v.ap_mut(end.index)) {
                ap.bind(id)?;
            }
        }
        self.edges.push(Edge::new(id, src, trg, bond));
        Ok(id)
    }

    /// Remove an edge, freeing its APs. Rings running along the edge are dropped.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge> {
        let pos = self
            .edges
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| GraphError::structural(format!("no edge {id} in graph {}", self.id)))?;
        let edge = self.edges.remove(pos);
        for end in [edge.src(), edge.trg()] {
            if let Some(ap) = self.vertex_mut(end.vertex).and_then(|v| v.ap_mut(end.index)) {
                ap.unbind()?;
            }
        }
        let (a, b) = (edge.src_vertex(), edge.trg_vertex());
        self.rings.retain(|ring| {
            let crosses = ring
                .vertices()
                .windows(2)
                .any(|w| (w[0] == a && w[1] == b) || (w[0] == b && w[1] == a));
            if crosses {
                debug!("Dropping ring running along removed edge {}", id);
            }
            !crosses
        });
        Ok(edge)
    }

    /// Remove a vertex together with its edges, the rings it belongs to and
    /// its symmetric-set membership.
    ///
    /// Children of an interior vertex are left without parent; nothing is relinked.
    pub fn remove_vertex(&mut self, id: VertexId) -> Result<Vertex> {
        let pos = self
            .vertices
            .iter()
            .position(|v| v.id() == id)
            .ok_or_else(|| GraphError::structural(format!("no vertex {id} in graph {}", self.id)))?;

        let before = self.rings.len();
        self.rings.retain(|ring| !ring.contains(id));
        if before != self.rings.len() {
            debug!("Removed {} ring(s) through vertex {}", before - self.rings.len(), id);
        }

        let touching: Vec<EdgeId> = self
            .edges
            .iter()
            .filter(|e| e.involves(id))
            .map(Edge::id)
            .collect();
        for edge in touching {
            self.remove_edge(edge)?;
        }

        self.drop_from_symmetric_sets(id);
        Ok(self.vertices.remove(pos))
    }

    /// Remove `id` and all of its descendants.
    pub fn remove_branch(&mut self, id: VertexId) -> Result<Vec<Vertex>> {
        if !self.contains_vertex(id) {
            return Err(GraphError::structural(format!("no vertex {id} in graph {}", self.id)));
        }
        let mut doomed = vec![id];
        doomed.extend(self.children_tree(id, ChildrenTreeLimits::default()));
        let mut removed = Vec::with_capacity(doomed.len());
        for v in doomed {
            removed.push(self.remove_vertex(v)?);
        }
        Ok(removed)
    }

    /// `vertex`, its parent, its grandparent and so on up to the source.
    pub fn ancestors(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut chain = vec![vertex];
        let mut current = vertex;
        while let Some(parent) = self.parent_of(current) {
            if chain.contains(&parent) || chain.len() > self.vertices.len() {
                warn!("Parent chain of vertex {} in graph {} loops", vertex, self.id);
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// The root of the spanning tree.
    pub fn source_vertex(&self) -> Option<VertexId> {
        let first = self.vertices.first()?.id();
        self.ancestors(first).last().copied()
    }

    /// Distance from the source: -1 for the source itself, 0 for its children.
    pub fn level(&self, vertex: VertexId) -> Option<i32> {
        if !self.contains_vertex(vertex) {
            return None;
        }
        Some(self.ancestors(vertex).len() as i32 - 2)
    }

    /// Descendants of `vertex` in depth-first order, `vertex` excluded.
    pub fn children_tree(&self, vertex: VertexId, limits: ChildrenTreeLimits) -> Vec<VertexId> {
        let mut collected = Vec::new();
        self.collect_children(vertex, 1, &limits, &mut collected);
        collected
    }

    fn collect_children(
        &self,
        vertex: VertexId,
        depth: usize,
        limits: &ChildrenTreeLimits,
        collected: &mut Vec<VertexId>,
    ) {
        if limits.max_depth.map(|max| depth > max).unwrap_or(false) {
            return;
        }
        for child in self.children_of(vertex) {
            if collected.contains(&child) {
                continue;
            }
            let is_rcv = self.vertex(child).map(Vertex::is_ring_closing).unwrap_or(false);
            if limits.stop_before_rcvs && is_rcv {
                continue;
            }
            collected.push(child);
            let branching = self.children_of(child).len();
            if limits
                .branching_threshold
                .map(|threshold| branching > threshold)
                .unwrap_or(false)
            {
                continue;
            }
            self.collect_children(child, depth + 1, limits, collected);
        }
    }

    /// The path between two vertices along the spanning tree, both ends included.
    pub fn tree_path(&self, from: VertexId, to: VertexId) -> Option<Vec<VertexId>> {
        if !self.contains_vertex(from) || !self.contains_vertex(to) {
            return None;
        }
        let up_from = self.ancestors(from);
        let up_to = self.ancestors(to);
        let (i, common) = up_from
            .iter()
            .enumerate()
            .find(|(_, v)| up_to.contains(v))?;
        let j = up_to.iter().position(|v| v == common)?;
        let mut path: Vec<VertexId> = up_from[..=i].to_vec();
        path.extend(up_to[..j].iter().rev());
        Some(path)
    }

    /// Give every vertex a fresh id, updating edges, rings and symmetric sets.
    ///
    /// Returns the map from old to new ids.
    pub fn renumber_vertices(&mut self, ids: &IdCounters) -> BTreeMap<VertexId, VertexId> {
        let mut map = BTreeMap::new();
        for vertex in self.vertices.iter_mut() {
            let new_id = ids.unique_vertex_index();
            map.insert(vertex.id(), new_id);
            vertex.set_id(new_id);
        }
        let lookup = |old: VertexId| map.get(&old).copied().unwrap_or(old);
        for edge in self.edges.iter_mut() {
            edge.remap_vertices(lookup);
        }
        for ring in self.rings.iter_mut() {
            ring.remap(lookup);
        }
        for set in self.sym_sets.iter_mut() {
            set.remap(lookup);
        }
        debug!("Renumbered {} vertices of graph {}", map.len(), self.id);
        map
    }

    /// Largest vertex id used in this graph and in all nested graphs.
    pub fn max_vertex_id(&self) -> Option<VertexId> {
        self.vertices
            .iter()
            .flat_map(|v| {
                let nested = v
                    .template()
                    .and_then(Template::inner_graph)
                    .and_then(DGraph::max_vertex_id);
                std::iter::once(v.id()).chain(nested)
            })
            .max()
    }

    /// The graph reached by walking into the templates listed in `path`.
    pub fn graph_at(&self, path: &[VertexId]) -> Option<&DGraph> {
        let mut graph = self;
        for step in path {
            graph = graph.vertex(*step)?.template()?.inner_graph()?;
        }
        Some(graph)
    }

    pub fn vertex_at(&self, location: &VertexLocation) -> Option<&Vertex> {
        self.graph_at(&location.path)?.vertex(location.vertex)
    }

    /// Templates to walk through to reach the nested graph with id `graph`.
    pub fn embedding_path(&self, graph: GraphId) -> Option<Vec<VertexId>> {
        if self.id == graph {
            return Some(Vec::new());
        }
        self.vertices.iter().find_map(|v| {
            let inner = v.template()?.inner_graph()?;
            let mut path = inner.embedding_path(graph)?;
            path.insert(0, v.id());
            Some(path)
        })
    }

    /// The AP linked to `location`, resolving through the templates that
    /// embed it: an AP free in its own graph is followed out to the outer AP
    /// of its template, and so on up to the outermost graph.
    pub fn linked_ap_throughout(&self, location: &ApLocation) -> Option<ApLocation> {
        let graph = self.graph_at(&location.path)?;
        graph.ap(location.ap)?;
        if let Some(linked) = graph.linked_ap(location.ap) {
            return Some(ApLocation::new(location.path.clone(), linked));
        }
        let outer = self.outer_location(location)?;
        self.linked_ap_throughout(&outer)
    }

    /// Whether the AP is free at every nesting level.
    pub fn is_available_throughout(&self, location: &ApLocation) -> bool {
        self.graph_at(&location.path)
            .and_then(|g| g.ap(location.ap))
            .is_some()
            && self.linked_ap_throughout(location).is_none()
    }

    /// The outer AP, one level up, that projects the AP at `location`.
    fn outer_location(&self, location: &ApLocation) -> Option<ApLocation> {
        let (jacket, host_path) = location.path.split_last()?;
        let template = self.graph_at(host_path)?.vertex(*jacket)?;
        let index = template.outer_ap_of(location.ap)?;
        Some(ApLocation::new(host_path.to_vec(), ApRef::new(*jacket, index)))
    }

    /// The same AP seen from the outermost graph it is exposed to.
    pub fn surface_ap(&self, location: &ApLocation) -> Option<ApLocation> {
        let mut current = location.clone();
        self.graph_at(&current.path)?.ap(current.ap)?;
        while let Some(outer) = self.outer_location(&current) {
            current = outer;
        }
        Some(current)
    }

    /// The deepest AP projected by the AP at `location`.
    pub fn embedded_ap(&self, location: &ApLocation) -> Option<ApLocation> {
        let graph = self.graph_at(&location.path)?;
        let vertex = graph.vertex(location.ap.vertex)?;
        vertex.ap(location.ap.index)?;
        match vertex.inner_ap_of(location.ap.index) {
            Some(inner) => {
                let mut path = location.path.clone();
                path.push(vertex.id());
                self.embedded_ap(&ApLocation::new(path, inner))
            }
            None => Some(location.clone()),
        }
    }

    /// The free APs of this graph, each resolved to the deepest AP it projects.
    pub fn available_aps_throughout(&self) -> Vec<ApLocation> {
        self.free_aps()
            .into_iter()
            .filter_map(|ap| self.embedded_ap(&ApLocation::top_level(ap)))
            .collect()
    }

    /// Every vertex, at any depth, that offers itself for mutation.
    pub fn mutable_sites(&self, excluded: &[MutationType]) -> Vec<VertexLocation> {
        self.vertices
            .iter()
            .flat_map(|v| v.mutation_sites(excluded))
            .collect()
    }

    pub fn pick_mutation_site(
        &self,
        randomizer: &mut Randomizer,
        excluded: &[MutationType],
    ) -> Option<VertexLocation> {
        let sites = self.mutable_sites(excluded);
        let site = randomizer.choose(&sites).cloned();
        debug!("Picked mutation site {:?} among {}", site, sites.len());
        site
    }

    /// Check the bookkeeping invariants of this graph and of all nested graphs.
    pub fn check_consistency(&self) -> Result<()> {
        let mut seen_ids = BTreeSet::new();
        for vertex in &self.vertices {
            if !seen_ids.insert(vertex.id()) {
                return Err(GraphError::structural(format!("duplicate vertex id {}", vertex.id())));
            }
            for (index, ap) in vertex.attachment_points().iter().enumerate() {
                if let Some(user) = ap.user() {
                    let uses = self
                        .edge(user)
                        .map(|e| e.uses(vertex.ap_ref(index)))
                        .unwrap_or(false);
                    if !uses {
                        return Err(GraphError::structural(format!(
                            "{} refers to edge {user} which does not use it",
                            vertex.ap_ref(index)
                        )));
                    }
                }
            }
            if let Some(inner) = vertex.template().and_then(Template::inner_graph) {
                inner.check_consistency()?;
            }
        }

        let mut targets = BTreeSet::new();
        for edge in &self.edges {
            for end in [edge.src(), edge.trg()] {
                if self.ap(end).and_then(AttachmentPoint::user) != Some(edge.id()) {
                    return Err(GraphError::structural(format!(
                        "edge {} uses {end} which is not bound to it",
                        edge.id()
                    )));
                }
            }
            if !targets.insert(edge.trg_vertex()) {
                return Err(GraphError::structural(format!(
                    "vertex {} has more than one parent",
                    edge.trg_vertex()
                )));
            }
        }

        for ring in &self.rings {
            for end in [ring.head(), ring.tail()].into_iter().flatten() {
                if !self.vertex(end).map(Vertex::is_ring_closing).unwrap_or(false) {
                    return Err(GraphError::structural(format!(
                        "ring endpoint {end} is not a ring-closing vertex"
                    )));
                }
            }
            for pair in ring.vertices().windows(2) {
                let adjacent = self.parent_of(pair[0]) == Some(pair[1])
                    || self.parent_of(pair[1]) == Some(pair[0]);
                if !adjacent {
                    return Err(GraphError::structural(format!(
                        "ring members {} and {} are not adjacent",
                        pair[0], pair[1]
                    )));
                }
            }
        }

        let mut in_sets = BTreeSet::new();
        for set in &self.sym_sets {
            if set.len() < 2 {
                return Err(GraphError::structural("symmetric set with fewer than two members"));
            }
            for id in set.ids() {
                if !self.contains_vertex(*id) || !in_sets.insert(*id) {
                    return Err(GraphError::structural(format!(
                        "vertex {id} is missing or in more than one symmetric set"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linker(id: VertexId, n_aps: usize) -> Vertex {
        let mut v = Vertex::molecular_unit(id, BuildingBlockRef::new(0, BBType::Fragment), "C");
        for _ in 0..n_aps {
            v.add_ap(AttachmentPoint::new(None)).unwrap();
        }
        v
    }

    /// 1 -> 2 -> 3, 1 -> 4, 2 -> 5
    fn small_tree() -> DGraph {
        let mut g = DGraph::with_id(1);
        g.add_vertex(linker(1, 2)).unwrap();
        g.add_vertex(linker(2, 3)).unwrap();
        g.add_vertex(linker(3, 1)).unwrap();
        g.add_vertex(linker(4, 1)).unwrap();
        g.add_vertex(linker(5, 1)).unwrap();
        g.add_edge((1, 0).into(), (2, 0).into(), BondType::Single).unwrap();
        g.add_edge((2, 1).into(), (3, 0).into(), BondType::Single).unwrap();
        g.add_edge((1, 1).into(), (4, 0).into(), BondType::Double).unwrap();
        g.add_edge((2, 2).into(), (5, 0).into(), BondType::Single).unwrap();
        g
    }

    #[test]
    fn test_add_edge_validation() {
        let mut g = small_tree();
        // AP already in use
        assert!(g.add_edge((1, 0).into(), (3, 0).into(), BondType::Single).is_err());
        // unknown vertex
        g.add_vertex(linker(6, 2)).unwrap();
        assert!(g.add_edge((6, 0).into(), (9, 0).into(), BondType::Single).is_err());
        // second parent
        g.add_vertex(linker(7, 1)).unwrap();
        assert!(g.add_edge((7, 0).into(), (6, 0).into(), BondType::Single).is_ok());
        assert!(g.add_edge((6, 1).into(), (7, 0).into(), BondType::Single).is_err());
        g.check_consistency().unwrap();
    }

    #[test]
    fn test_tree_navigation() {
        let g = small_tree();
        assert_eq!(g.source_vertex(), Some(1));
        assert_eq!(g.level(1), Some(-1));
        assert_eq!(g.level(2), Some(0));
        assert_eq!(g.level(5), Some(1));
        assert_eq!(g.level(42), None);
        assert_eq!(g.children_of(2), vec![3, 5]);
        assert_eq!(g.tree_path(3, 4), Some(vec![3, 2, 1, 4]));
        assert_eq!(g.tree_path(5, 5), Some(vec![5]));
        assert_eq!(g.linked_ap((2, 1).into()), Some((3, 0).into()));
    }

    #[test]
    fn test_children_tree_limits() {
        let g = small_tree();
        assert_eq!(g.children_tree(1, ChildrenTreeLimits::default()), vec![2, 3, 5, 4]);
        let shallow = ChildrenTreeLimits {
            max_depth: Some(1),
            ..Default::default()
        };
        assert_eq!(g.children_tree(1, shallow), vec![2, 4]);
        let stop = ChildrenTreeLimits {
            branching_threshold: Some(1),
            ..Default::default()
        };
        assert_eq!(g.children_tree(1, stop), vec![2, 4]);
    }

    #[test]
    fn test_remove_interior_vertex_cuts_edges() {
        let mut g = small_tree();
        let removed = g.remove_vertex(2).unwrap();
        assert_eq!(removed.free_ap_count(), 3);
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 1);
        assert!(g.vertex(1).unwrap().ap(0).unwrap().is_available());
        assert!(g.parent_of(3).is_none());
        assert!(g.remove_vertex(2).is_err());
        g.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_branch() {
        let mut g = small_tree();
        let removed = g.remove_branch(2).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(g.vertex_ids(), vec![1, 4]);
    }

    #[test]
    fn test_renumber_keeps_structure() {
        let ids = IdCounters::starting_at(100, 1);
        let mut g = small_tree();
        let map = g.renumber_vertices(&ids);
        assert_eq!(map[&1], 100);
        assert_eq!(g.source_vertex(), Some(100));
        assert_eq!(g.children_of(map[&2]), vec![map[&3], map[&5]]);
        g.check_consistency().unwrap();
        assert_eq!(g.max_vertex_id(), Some(104));
    }

    #[test]
    fn test_mutable_sites_and_pick() {
        let g = small_tree();
        assert_eq!(g.mutable_sites(&[]).len(), 5);
        let mut rng = Randomizer::new(7);
        let site = g.pick_mutation_site(&mut rng, &[]).unwrap();
        assert!(g.vertex_at(&site).is_some());
        assert!(g.pick_mutation_site(&mut rng, &MutationType::ALL).is_none());
    }
}
