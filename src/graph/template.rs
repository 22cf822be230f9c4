use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::*;

use super::ap::{ApClass, ApRef, AttachmentPoint};
use super::vertex::{BuildingBlockRef, Vertex, VertexBody};
use super::DGraph;
use crate::{GraphError, IdCounters, Result, VertexId};

/// How much the inner graph of a template may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractLevel {
    /// The inner graph can be edited and re-assigned.
    Free,
    /// Inner vertices can be swapped but the inner topology must stay.
    FixedStructure,
    /// The inner graph cannot change once assigned.
    Fixed,
}

/// An outer AP a template promises to expose.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredAp {
    pub class: Option<ApClass>,
    pub direction: Option<[f64; 3]>,
}

/// Free APs of an inner graph that an edit moved elsewhere: `(old, new)`.
pub type ApRenames = Vec<(ApRef, ApRef)>;

/// Body of a template vertex: a nested graph whose free APs are projected as
/// the outer APs of the vertex.
///
/// `projections[i]` is the inner AP behind outer AP `i`.
#[derive(Debug, Clone)]
pub struct Template {
    contract: ContractLevel,
    required: Vec<RequiredAp>,
    inner: Option<DGraph>,
    projections: Vec<ApRef>,
}

impl Template {
    pub(crate) fn new(contract: ContractLevel) -> Self {
        Self {
            contract,
            required: Vec::new(),
            inner: None,
            projections: Vec::new(),
        }
    }

    /// Rebuild a template from its parts, as read from a serialized graph.
    pub(crate) fn restore(
        contract: ContractLevel,
        required: Vec<RequiredAp>,
        inner: Option<DGraph>,
        projections: Vec<ApRef>,
    ) -> Self {
        Self {
            contract,
            required,
            inner,
            projections,
        }
    }

    pub fn contract_level(&self) -> ContractLevel {
        self.contract
    }

    pub fn required_aps(&self) -> &[RequiredAp] {
        &self.required
    }

    pub fn inner_graph(&self) -> Option<&DGraph> {
        self.inner.as_ref()
    }

    pub fn projections(&self) -> &[ApRef] {
        &self.projections
    }

    pub(super) fn set_jacket(&mut self, jacket: VertexId) {
        if let Some(inner) = self.inner.as_mut() {
            inner.set_jacket(Some(jacket));
        }
    }

    /// Fresh ids for the inner graph and everything nested in it.
    pub(super) fn refresh_ids(&mut self, ids: &IdCounters) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        let map = inner.renumber_vertices(ids);
        inner.set_id(ids.unique_graph_index());
        for proj in self.projections.iter_mut() {
            if let Some(new_id) = map.get(&proj.vertex) {
                proj.vertex = *new_id;
            }
        }
        for vertex in inner.vertices.iter_mut() {
            if let VertexBody::Template(nested) = &mut vertex.body {
                nested.refresh_ids(ids);
            }
        }
    }

    pub fn same_as(&self, other: &Template) -> bool {
        if !self.same_terms_as(other) {
            return false;
        }
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => a.is_isomorphic_to(b),
            _ => true,
        }
    }

    /// Contract, required APs and presence of an inner graph, leaving the
    /// inner graphs themselves uncompared.
    pub(crate) fn same_terms_as(&self, other: &Template) -> bool {
        self.contract == other.contract
            && self.required == other.required
            && self.inner.is_some() == other.inner.is_some()
    }
}

impl Vertex {
    pub fn template(&self) -> Option<&Template> {
        match &self.body {
            VertexBody::Template(t) => Some(t),
            _ => None,
        }
    }

    /// Rebuild a template vertex read back from a serialized graph. `aps` are
    /// the outer APs, one per projection of `template`.
    pub(crate) fn restored_template(
        id: VertexId,
        building_block: BuildingBlockRef,
        mut template: Template,
        aps: Vec<AttachmentPoint>,
    ) -> Result<Vertex> {
        if template.projections.len() != aps.len() {
            return Err(GraphError::structural(format!(
                "template {id} has {} outer APs but {} projections",
                aps.len(),
                template.projections.len()
            )));
        }
        if let Some(inner) = template.inner.as_ref() {
            if let Some(bad) = template
                .projections
                .iter()
                .find(|p| !inner.ap(**p).map(AttachmentPoint::is_available).unwrap_or(false))
            {
                return Err(GraphError::structural(format!(
                    "template {id} projects {bad}, which is not a free AP of its inner graph"
                )));
            }
        }
        template.set_jacket(id);
        let mut vertex = Vertex::new_template(id, building_block, template.contract);
        vertex.aps = aps;
        vertex.body = VertexBody::Template(Box::new(template));
        Ok(vertex)
    }

    fn template_body(&mut self) -> Result<&mut Template> {
        let id = self.id;
        match &mut self.body {
            VertexBody::Template(t) => Ok(t),
            _ => Err(GraphError::invalid_edit(format!("vertex {id} is not a template"))),
        }
    }

    pub fn inner_graph(&self) -> Option<&DGraph> {
        self.template()?.inner_graph()
    }

    /// The inner AP projected as outer AP `outer_index`.
    pub fn inner_ap_of(&self, outer_index: usize) -> Option<ApRef> {
        self.template()?.projections.get(outer_index).copied()
    }

    /// Index of the outer AP that projects the inner AP `inner`.
    pub fn outer_ap_of(&self, inner: ApRef) -> Option<usize> {
        self.template()?.projections.iter().position(|p| *p == inner)
    }

    /// Change the contract level. Loosening a fixed template that already has
    /// an inner graph is refused.
    pub fn set_contract_level(&mut self, level: ContractLevel) -> Result<()> {
        let id = self.id;
        let template = self.template_body()?;
        if template.contract == ContractLevel::Fixed
            && level != ContractLevel::Fixed
            && template.inner.is_some()
        {
            return Err(GraphError::immutable(format!(
                "template {id} is frozen and cannot be loosened"
            )));
        }
        template.contract = level;
        Ok(())
    }

    /// Make the template fixed. Returns whether it already was.
    pub fn freeze(&mut self) -> Result<bool> {
        let template = self.template_body()?;
        let was_frozen = template.contract == ContractLevel::Fixed;
        template.contract = ContractLevel::Fixed;
        Ok(was_frozen)
    }

    /// Declare an outer AP the inner graph will have to provide.
    pub fn add_required_ap(&mut self, class: Option<ApClass>, direction: Option<[f64; 3]>) -> Result<()> {
        let id = self.id;
        let template = self.template_body()?;
        if template.inner.is_some() {
            return Err(GraphError::immutable(format!(
                "template {id} already has an inner graph, no more required APs can be declared"
            )));
        }
        template.required.push(RequiredAp { class, direction });
        Ok(())
    }

    /// Assign the inner graph and project all of its free APs outward.
    ///
    /// The inner graph must offer a distinct free AP for every required AP,
    /// with the same class. Only a free-contract template whose outer APs are
    /// all unused can receive a second inner graph.
    pub fn set_inner_graph(&mut self, mut graph: DGraph) -> Result<()> {
        let id = self.id;
        let Vertex { aps, body, .. } = self;
        let VertexBody::Template(template) = body else {
            return Err(GraphError::invalid_edit(format!("vertex {id} is not a template")));
        };

        if template.inner.is_some() {
            if template.contract != ContractLevel::Free {
                return Err(GraphError::immutable(format!(
                    "template {id} has contract {:?} and already has an inner graph",
                    template.contract
                )));
            }
            if aps.iter().any(|ap| !ap.is_available()) {
                return Err(GraphError::TemplateSignatureChanged {
                    template: id,
                    detail: "cannot swap the inner graph while outer APs are in use".into(),
                });
            }
        }

        let free = graph.free_aps();
        if free.len() < template.required.len() {
            return Err(GraphError::invalid_edit(format!(
                "inner graph offers {} free APs but template {id} requires {}",
                free.len(),
                template.required.len()
            )));
        }
        let mut claimed: BTreeMap<ApRef, usize> = BTreeMap::new();
        for (r, required) in template.required.iter().enumerate() {
            let found = free.iter().find(|candidate| {
                !claimed.contains_key(candidate)
                    && graph.ap(**candidate).and_then(AttachmentPoint::class) == required.class.as_ref()
            });
            match found {
                Some(ap) => {
                    claimed.insert(*ap, r);
                }
                None => {
                    return Err(GraphError::invalid_edit(format!(
                        "inner graph has no free AP matching required AP {r} ({:?}) of template {id}",
                        required.class
                    )))
                }
            }
        }

        let mut outer = Vec::with_capacity(free.len());
        for inner_ap in &free {
            let Some(ap) = graph.ap(*inner_ap) else {
                continue;
            };
            let mut projected = ap.detached();
            if let Some(direction) = claimed
                .get(inner_ap)
                .and_then(|r| template.required[*r].direction)
            {
                projected = projected.with_direction(direction);
            }
            outer.push(projected);
        }

        graph.set_jacket(Some(id));
        debug!(
            "Template {} wraps graph {} exposing {} APs",
            id,
            graph.id(),
            outer.len()
        );
        template.inner = Some(graph);
        template.projections = free;
        *aps = outer;
        Ok(())
    }

    /// Edit the inner graph of a template as one transaction.
    ///
    /// `edit` works on a copy of the inner graph and reports the free APs it
    /// moved (see [`DGraph::replace_single_subgraph`]). On success the copy
    /// replaces the inner graph and the outer APs are re-synchronized:
    /// projections follow renamed APs, newly exposed free APs become new outer
    /// APs. The edit is refused when a used outer AP would lose its inner AP
    /// or change its index.
    pub fn edit_inner_graph<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut DGraph) -> Result<ApRenames>,
    {
        let id = self.id;
        let Vertex { aps, body, .. } = self;
        let VertexBody::Template(template) = body else {
            return Err(GraphError::invalid_edit(format!("vertex {id} is not a template")));
        };
        if template.contract == ContractLevel::Fixed {
            return Err(GraphError::immutable(format!(
                "inner graph of fixed template {id} cannot be edited"
            )));
        }
        let Some(current) = template.inner.as_ref() else {
            return Err(GraphError::invalid_edit(format!("template {id} has no inner graph")));
        };

        let mut work = current.clone();
        let renames: BTreeMap<ApRef, ApRef> = edit(&mut work)?.into_iter().collect();

        if template.contract == ContractLevel::FixedStructure && !current.is_isostructural_to(&work) {
            return Err(GraphError::immutable(format!(
                "edit would change the inner structure of template {id}"
            )));
        }

        let mut projections = Vec::with_capacity(template.projections.len());
        let mut outer = Vec::with_capacity(aps.len());
        let mut dropped = Vec::new();
        for (i, old) in template.projections.iter().enumerate() {
            let proj = renames.get(old).copied().unwrap_or(*old);
            match work.ap(proj) {
                Some(inner_ap) if inner_ap.is_available() => {
                    let mut outer_ap = aps[i].clone();
                    outer_ap.set_class(inner_ap.class().cloned());
                    projections.push(proj);
                    outer.push(outer_ap);
                }
                _ => dropped.push(i),
            }
        }

        if let Some(i) = dropped.iter().find(|i| !aps[**i].is_available()) {
            return Err(GraphError::TemplateSignatureChanged {
                template: id,
                detail: format!("outer AP {i} is in use but its inner AP is gone"),
            });
        }
        if let Some(first) = dropped.first() {
            if let Some(j) = (first + 1..aps.len()).find(|j| !aps[*j].is_available()) {
                return Err(GraphError::TemplateSignatureChanged {
                    template: id,
                    detail: format!("dropping outer AP {first} would shift used outer AP {j}"),
                });
            }
            debug!("Template {} drops {} outer AP(s)", id, dropped.len());
        }

        for free in work.free_aps() {
            if projections.contains(&free) {
                continue;
            }
            if let Some(ap) = work.ap(free) {
                outer.push(ap.detached());
                projections.push(free);
                trace!("Template {} projects new inner AP {}", id, free);
            }
        }

        work.set_jacket(Some(id));
        template.inner = Some(work);
        template.projections = projections;
        *aps = outer;
        Ok(())
    }
}

impl DGraph {
    /// Edit the inner graph of the template vertex `template` of this graph.
    pub fn edit_template<F>(&mut self, template: VertexId, edit: F) -> Result<()>
    where
        F: FnOnce(&mut DGraph) -> Result<ApRenames>,
    {
        let graph_id = self.id;
        let vertex = self.vertex_mut(template).ok_or_else(|| {
            GraphError::structural(format!("no vertex {template} in graph {graph_id}"))
        })?;
        vertex.edit_inner_graph(edit)
    }

    /// Edit the graph found by walking into the templates listed in `path`.
    ///
    /// Every template along the way re-synchronizes its outer APs, so changes
    /// to free APs propagate up to this graph.
    pub fn edit_nested<F>(&mut self, path: &[VertexId], edit: F) -> Result<ApRenames>
    where
        F: FnOnce(&mut DGraph) -> Result<ApRenames>,
    {
        match path.split_first() {
            None => edit(self),
            Some((first, rest)) => {
                self.edit_template(*first, |inner| inner.edit_nested(rest, edit))?;
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApLocation, BBType, BondType, BuildingBlockRef};

    fn class(s: &str) -> Option<ApClass> {
        Some(s.parse().unwrap())
    }

    fn unit(id: VertexId, classes: &[&str]) -> Vertex {
        let mut v = Vertex::molecular_unit(id, BuildingBlockRef::new(id as usize, BBType::Fragment), "C");
        for c in classes {
            v.add_ap(AttachmentPoint::new(class(c))).unwrap();
        }
        v
    }

    /// 1(a:0, b:0, c:0) -> 2(c:1, d:0)
    fn inner_graph() -> DGraph {
        let mut g = DGraph::with_id(50);
        g.add_vertex(unit(1, &["a:0", "b:0", "c:0"])).unwrap();
        g.add_vertex(unit(2, &["c:1", "d:0"])).unwrap();
        g.add_edge((1, 2).into(), (2, 0).into(), BondType::Single).unwrap();
        g
    }

    fn template(contract: ContractLevel) -> Vertex {
        Vertex::new_template(10, BuildingBlockRef::new(0, BBType::Fragment), contract)
    }

    #[test]
    fn test_set_inner_graph_projects_free_aps() {
        let mut t = template(ContractLevel::Free);
        t.add_required_ap(class("b:0"), Some([0.0, 1.0, 0.0])).unwrap();
        t.set_inner_graph(inner_graph()).unwrap();
        assert_eq!(t.ap_count(), 3);
        assert_eq!(t.inner_ap_of(2), Some(ApRef::new(2, 1)));
        assert_eq!(t.outer_ap_of(ApRef::new(1, 1)), Some(1));
        assert_eq!(t.ap(1).unwrap().direction(), Some([0.0, 1.0, 0.0]));
        assert_eq!(t.inner_graph().unwrap().jacket(), Some(10));
        assert!(t.add_required_ap(class("x:0"), None).is_err());
    }

    #[test]
    fn test_required_aps_must_be_available() {
        let mut t = template(ContractLevel::Free);
        t.add_required_ap(class("c:1"), None).unwrap();
        assert!(matches!(t.set_inner_graph(inner_graph()), Err(GraphError::InvalidEdit(_))));

        let mut t = template(ContractLevel::Free);
        for _ in 0..4 {
            t.add_required_ap(None, None).unwrap();
        }
        assert!(t.set_inner_graph(inner_graph()).is_err());
    }

    #[test]
    fn test_fixed_template_is_immutable() {
        let mut t = template(ContractLevel::Fixed);
        t.set_inner_graph(inner_graph()).unwrap();
        assert!(matches!(
            t.set_inner_graph(inner_graph()),
            Err(GraphError::ImmutableTemplate(_))
        ));
        let result = t.edit_inner_graph(|g| {
            g.remove_vertex(2)?;
            Ok(Vec::new())
        });
        assert!(matches!(result, Err(GraphError::ImmutableTemplate(_))));
        assert_eq!(t.inner_graph().unwrap().vertex_count(), 2);
        assert!(t.set_contract_level(ContractLevel::Free).is_err());
    }

    #[test]
    fn test_free_template_edit_resyncs_outer_aps() {
        let mut t = template(ContractLevel::Free);
        t.set_inner_graph(inner_graph()).unwrap();
        t.edit_inner_graph(|g| {
            g.add_vertex(unit(3, &["e:0", "f:0"]))?;
            g.add_edge((2, 1).into(), (3, 0).into(), BondType::Single)?;
            Ok(Vec::new())
        })
        .unwrap();
        // d:0 of vertex 2 is gone, f:0 of vertex 3 is appended
        assert_eq!(t.ap_count(), 3);
        assert_eq!(t.inner_ap_of(2), Some(ApRef::new(3, 1)));
        assert_eq!(t.ap(2).unwrap().class(), class("f:0").as_ref());
    }

    #[test]
    fn test_edit_cannot_drop_used_outer_ap() {
        let mut t = template(ContractLevel::Free);
        t.set_inner_graph(inner_graph()).unwrap();
        t.aps[2].bind(1).unwrap();
        let result = t.edit_inner_graph(|g| {
            g.remove_vertex(2)?;
            Ok(Vec::new())
        });
        assert!(matches!(result, Err(GraphError::TemplateSignatureChanged { .. })));
        assert_eq!(t.inner_graph().unwrap().vertex_count(), 2);

        // dropping outer AP 0 would shift the used AP 2
        let result = t.edit_inner_graph(|g| {
            g.add_vertex(unit(3, &["z:0"]))?;
            g.add_edge((1, 0).into(), (3, 0).into(), BondType::Single)?;
            Ok(Vec::new())
        });
        assert!(matches!(result, Err(GraphError::TemplateSignatureChanged { .. })));
    }

    #[test]
    fn test_fixed_structure_allows_only_swaps() {
        let mut t = template(ContractLevel::FixedStructure);
        t.set_inner_graph(inner_graph()).unwrap();
        let grow = t.edit_inner_graph(|g| {
            g.add_vertex(unit(3, &["e:0"]))?;
            g.add_edge((2, 1).into(), (3, 0).into(), BondType::Single)?;
            Ok(Vec::new())
        });
        assert!(matches!(grow, Err(GraphError::ImmutableTemplate(_))));

        t.edit_inner_graph(|g| {
            let v = g.vertex_mut(2).unwrap();
            v.set_building_block(BuildingBlockRef::new(99, BBType::Fragment));
            Ok(Vec::new())
        })
        .unwrap();
        assert_eq!(
            t.inner_graph().unwrap().vertex(2).unwrap().building_block().id,
            99
        );

        let rebond = t.edit_inner_graph(|g| {
            let edge = g.edge_to_parent(2).map(|e| e.id()).unwrap();
            g.remove_edge(edge)?;
            g.add_edge((1, 2).into(), (2, 0).into(), BondType::Double)?;
            Ok(Vec::new())
        });
        assert!(matches!(rebond, Err(GraphError::ImmutableTemplate(_))));
        let inner = t.inner_graph().unwrap();
        assert_eq!(inner.edge_to_parent(2).unwrap().bond(), BondType::Single);
    }

    #[test]
    fn test_clone_detached_refreshes_inner_ids() {
        let ids = IdCounters::starting_at(500, 900);
        let mut t = template(ContractLevel::Free);
        t.set_inner_graph(inner_graph()).unwrap();
        let copy = t.clone_detached(&ids);
        let inner = copy.inner_graph().unwrap();
        assert_eq!(inner.jacket(), Some(copy.id()));
        assert!(inner.vertex(1).is_none());
        let projected = copy.inner_ap_of(0).unwrap();
        assert!(inner.ap(projected).unwrap().is_available());
        assert!(copy.same_as(&t));
    }

    /// graph 1 holding template 10 (around `inner_graph`) linked to vertex 20
    fn host() -> DGraph {
        let mut t = template(ContractLevel::Free);
        t.set_inner_graph(inner_graph()).unwrap();
        let mut g = DGraph::with_id(1);
        g.add_vertex(t).unwrap();
        g.add_vertex(unit(20, &["x:0"])).unwrap();
        g.add_edge((10, 0).into(), (20, 0).into(), BondType::Single).unwrap();
        g
    }

    #[test]
    fn test_ap_resolution_through_nesting() {
        let g = host();
        let inner = |vertex, index| ApLocation::new(vec![10], ApRef::new(vertex, index));

        assert_eq!(
            g.linked_ap_throughout(&inner(1, 0)),
            Some(ApLocation::top_level(ApRef::new(20, 0)))
        );
        assert!(!g.is_available_throughout(&inner(1, 0)));
        assert!(g.is_available_throughout(&inner(1, 1)));
        assert_eq!(
            g.surface_ap(&inner(2, 1)),
            Some(ApLocation::top_level(ApRef::new(10, 2)))
        );
        assert_eq!(
            g.embedded_ap(&ApLocation::top_level(ApRef::new(10, 2))),
            Some(inner(2, 1))
        );
        assert_eq!(g.available_aps_throughout(), vec![inner(1, 1), inner(2, 1)]);
        assert_eq!(g.embedding_path(50), Some(vec![10]));
    }

    #[test]
    fn test_edit_nested_resyncs_host() {
        let mut g = host();
        g.edit_nested(&[10], |inner| {
            inner.add_vertex(unit(3, &["e:0", "f:0"]))?;
            inner.add_edge((2, 1).into(), (3, 0).into(), BondType::Single)?;
            Ok(Vec::new())
        })
        .unwrap();
        let t = g.vertex(10).unwrap();
        assert_eq!(t.ap_count(), 3);
        assert_eq!(t.inner_ap_of(2), Some(ApRef::new(3, 1)));
        assert_eq!(g.linked_ap(ApRef::new(10, 0)), Some(ApRef::new(20, 0)));
        g.check_consistency().unwrap();
    }
}
