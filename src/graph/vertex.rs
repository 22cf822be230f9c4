use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use tracing::*;

use super::ap::{ApRef, AttachmentPoint};
use super::symmetry::SymmetricAps;
use super::template::{ContractLevel, Template};
use crate::{GraphError, IdCounters, Result, VertexId};

/// Role of a building block in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BBType {
    None,
    Scaffold,
    Fragment,
    Cap,
    Undefined,
}

impl BBType {
    /// Integer code used by the compact text format.
    pub fn legacy_int(&self) -> i32 {
        match self {
            BBType::None => -1,
            BBType::Scaffold => 0,
            BBType::Fragment => 1,
            BBType::Cap => 2,
            BBType::Undefined => -99,
        }
    }

    /// Inverse of [`BBType::legacy_int`]. Unknown codes map to `Undefined`.
    pub fn from_legacy_int(code: i32) -> Self {
        match code {
            -1 => BBType::None,
            0 => BBType::Scaffold,
            1 => BBType::Fragment,
            2 => BBType::Cap,
            _ => BBType::Undefined,
        }
    }

    /// Rank used when comparing edges as undirected relations:
    /// placeholders first, capping groups last.
    pub fn precedence(&self) -> i32 {
        match self {
            BBType::Undefined => 0,
            BBType::None => 1,
            BBType::Scaffold => 2,
            BBType::Fragment => 3,
            BBType::Cap => 4,
        }
    }
}

/// Reference to a building block of the library: its id within the list of
/// blocks of the same type, and the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildingBlockRef {
    pub id: usize,
    pub kind: BBType,
}

impl BuildingBlockRef {
    pub fn new(id: usize, kind: BBType) -> Self {
        Self { id, kind }
    }

    /// The reference carried by placeholder vertices.
    pub fn none() -> Self {
        Self {
            id: 0,
            kind: BBType::None,
        }
    }
}

/// Kinds of edits a vertex may be subjected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
    ChangeBranch,
    ChangeLink,
    DeleteLink,
    DeleteChain,
    AddLink,
    AddRing,
    Extend,
    Delete,
}

impl MutationType {
    pub const ALL: [MutationType; 8] = [
        MutationType::ChangeBranch,
        MutationType::ChangeLink,
        MutationType::DeleteLink,
        MutationType::DeleteChain,
        MutationType::AddLink,
        MutationType::AddRing,
        MutationType::Extend,
        MutationType::Delete,
    ];
}

/// Discriminator of the vertex variants, as written in serialized graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    #[serde(rename = "EmptyVertex")]
    Empty,
    #[serde(rename = "MolecularFragment")]
    MolecularUnit,
    Template,
}

/// What a vertex is made of.
#[derive(Debug, Clone)]
pub enum VertexBody {
    /// Placeholder without content.
    Empty,
    /// A unit whose chemical content is opaque to the graph engine.
    MolecularUnit { content: String },
    /// A vertex wrapping a nested graph.
    Template(Box<Template>),
}

/// Where a vertex lives: the templates to walk through from the outermost
/// graph, and the vertex id inside the graph reached that way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexLocation {
    pub path: Vec<VertexId>,
    pub vertex: VertexId,
}

impl VertexLocation {
    pub fn top_level(vertex: VertexId) -> Self {
        Self {
            path: Vec::new(),
            vertex,
        }
    }
}

/// A node of a [`DGraph`](crate::DGraph).
#[derive(Debug, Clone)]
pub struct Vertex {
    pub(super) id: VertexId,
    building_block: BuildingBlockRef,
    pub(super) aps: Vec<AttachmentPoint>,
    sym_aps: Vec<SymmetricAps>,
    ring_closing: bool,
    mutation_types: Vec<MutationType>,
    properties: BTreeMap<String, String>,
    uniquefying_keys: BTreeSet<String>,
    symmetry_label: Option<u64>,
    pub(super) body: VertexBody,
}

impl Vertex {
    fn with_body(id: VertexId, building_block: BuildingBlockRef, body: VertexBody) -> Self {
        Self {
            id,
            building_block,
            aps: Vec::new(),
            sym_aps: Vec::new(),
            ring_closing: false,
            mutation_types: MutationType::ALL.to_vec(),
            properties: BTreeMap::new(),
            uniquefying_keys: BTreeSet::new(),
            symmetry_label: None,
            body,
        }
    }

    /// A placeholder vertex without APs.
    pub fn empty(id: VertexId) -> Self {
        Self::with_body(id, BuildingBlockRef::none(), VertexBody::Empty)
    }

    pub fn molecular_unit(
        id: VertexId,
        building_block: BuildingBlockRef,
        content: impl Into<String>,
    ) -> Self {
        Self::with_body(
            id,
            building_block,
            VertexBody::MolecularUnit {
                content: content.into(),
            },
        )
    }

    /// A template vertex without inner graph.
    pub fn new_template(id: VertexId, building_block: BuildingBlockRef, contract: ContractLevel) -> Self {
        Self::with_body(
            id,
            building_block,
            VertexBody::Template(Box::new(Template::new(contract))),
        )
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: VertexId) {
        self.id = id;
        if let VertexBody::Template(template) = &mut self.body {
            template.set_jacket(id);
        }
    }

    pub fn building_block(&self) -> BuildingBlockRef {
        self.building_block
    }

    pub fn set_building_block(&mut self, building_block: BuildingBlockRef) {
        self.building_block = building_block;
    }

    pub fn bb_type(&self) -> BBType {
        self.building_block.kind
    }

    pub fn kind(&self) -> VertexKind {
        match self.body {
            VertexBody::Empty => VertexKind::Empty,
            VertexBody::MolecularUnit { .. } => VertexKind::MolecularUnit,
            VertexBody::Template(_) => VertexKind::Template,
        }
    }

    pub fn body(&self) -> &VertexBody {
        &self.body
    }

    /// Chemical payload of a molecular unit.
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            VertexBody::MolecularUnit { content } => Some(content),
            _ => None,
        }
    }

    pub fn attachment_points(&self) -> &[AttachmentPoint] {
        &self.aps
    }

    pub fn ap(&self, index: usize) -> Option<&AttachmentPoint> {
        self.aps.get(index)
    }

    pub(crate) fn ap_mut(&mut self, index: usize) -> Option<&mut AttachmentPoint> {
        self.aps.get_mut(index)
    }

    pub fn ap_ref(&self, index: usize) -> ApRef {
        ApRef::new(self.id, index)
    }

    /// Append an AP and return its index.
    ///
    /// Outer APs of templates are derived from their inner graph and cannot
    /// be added by hand.
    pub fn add_ap(&mut self, ap: AttachmentPoint) -> Result<usize> {
        if matches!(self.body, VertexBody::Template(_)) {
            return Err(GraphError::invalid_edit(format!(
                "APs of template {} are projected from its inner graph",
                self.id
            )));
        }
        if !ap.is_available() {
            return Err(GraphError::structural("cannot add an AP that is already in use"));
        }
        self.aps.push(ap);
        Ok(self.aps.len() - 1)
    }

    pub fn ap_count(&self) -> usize {
        self.aps.len()
    }

    pub fn free_ap_count(&self) -> usize {
        self.aps.iter().filter(|ap| ap.is_available()).count()
    }

    pub fn free_ap_indices(&self) -> Vec<usize> {
        (0..self.aps.len()).filter(|i| self.aps[*i].is_available()).collect()
    }

    pub fn used_ap_indices(&self) -> Vec<usize> {
        (0..self.aps.len()).filter(|i| !self.aps[*i].is_available()).collect()
    }

    pub(crate) fn detach_all_aps(&mut self) {
        for ap in self.aps.iter_mut() {
            *ap = ap.detached();
        }
    }

    pub fn symmetric_aps(&self) -> &[SymmetricAps] {
        &self.sym_aps
    }

    /// Declare a group of APs of this vertex as symmetric.
    pub fn add_symmetric_aps(&mut self, indices: Vec<usize>) -> Result<()> {
        let group = SymmetricAps::new(indices);
        if group.len() < 2 {
            return Err(GraphError::structural("a set of symmetric APs needs at least two APs"));
        }
        if let Some(bad) = group.indices().iter().find(|i| **i >= self.aps.len()) {
            return Err(GraphError::structural(format!(
                "vertex {} has no AP with index {bad}",
                self.id
            )));
        }
        if self.sym_aps.iter().any(|other| other.overlaps(&group)) {
            return Err(GraphError::structural(format!(
                "symmetric APs of vertex {} must not overlap",
                self.id
            )));
        }
        self.sym_aps.push(group);
        Ok(())
    }

    pub fn symmetric_aps_of(&self, index: usize) -> Option<&SymmetricAps> {
        self.sym_aps.iter().find(|group| group.contains(index))
    }

    pub fn is_ring_closing(&self) -> bool {
        self.ring_closing
    }

    pub fn set_ring_closing(&mut self, ring_closing: bool) {
        self.ring_closing = ring_closing;
    }

    /// Whether the APs of this vertex make it a ring-closing vertex: one AP
    /// with a ring-closing class.
    pub fn has_ring_closing_aps(&self) -> bool {
        self.aps.len() == 1
            && self.aps[0]
                .class()
                .map(|class| class.is_ring_closing())
                .unwrap_or(false)
    }

    pub fn mutation_types(&self) -> &[MutationType] {
        &self.mutation_types
    }

    pub fn set_mutation_types(&mut self, types: Vec<MutationType>) {
        self.mutation_types = types;
    }

    /// The allowed mutation types that are not in `excluded`.
    pub fn allowed_mutations(&self, excluded: &[MutationType]) -> Vec<MutationType> {
        self.mutation_types
            .iter()
            .filter(|t| !excluded.contains(t))
            .copied()
            .collect()
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Set a property whose value distinguishes this vertex in [`Vertex::same_as`].
    pub fn set_uniquefying_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.uniquefying_keys.insert(key.clone());
        self.properties.insert(key, value.into());
    }

    pub fn uniquefying_keys(&self) -> &BTreeSet<String> {
        &self.uniquefying_keys
    }

    pub(crate) fn symmetry_label(&self) -> Option<u64> {
        self.symmetry_label
    }

    pub(crate) fn set_symmetry_label(&mut self, label: Option<u64>) {
        self.symmetry_label = label;
    }

    /// Structural equality ignoring ids and edges.
    pub fn same_as(&self, other: &Vertex) -> bool {
        match (&self.body, &other.body) {
            (VertexBody::Template(a), VertexBody::Template(b)) => {
                self.same_as_outside(other) && a.same_as(b)
            }
            _ => self.same_as_outside(other),
        }
    }

    /// [`Vertex::same_as`] without looking into the graphs nested in
    /// templates.
    pub(crate) fn same_as_outside(&self, other: &Vertex) -> bool {
        if self.kind() != other.kind()
            || self.building_block != other.building_block
            || self.ring_closing != other.ring_closing
            || self.aps.len() != other.aps.len()
            || self.free_ap_count() != other.free_ap_count()
        {
            return false;
        }
        if !self
            .aps
            .iter()
            .zip(other.aps.iter())
            .all(|(a, b)| a.same_as(b))
        {
            return false;
        }

        match (&self.body, &other.body) {
            (VertexBody::Empty, VertexBody::Empty) => {
                self.uniquefying_keys == other.uniquefying_keys
                    && self
                        .uniquefying_keys
                        .iter()
                        .all(|key| self.properties.get(key) == other.properties.get(key))
            }
            (VertexBody::MolecularUnit { content: a }, VertexBody::MolecularUnit { content: b }) => {
                a == b
            }
            (VertexBody::Template(a), VertexBody::Template(b)) => a.same_terms_as(b),
            _ => false,
        }
    }

    /// A copy with a fresh id and no edges.
    ///
    /// AP classes, directions, symmetric-AP groups, mutation types and
    /// properties are kept. The inner graph of a template is copied with fresh
    /// vertex and graph ids.
    pub fn clone_detached(&self, ids: &IdCounters) -> Vertex {
        self.clone_as(ids.unique_vertex_index(), ids)
    }

    /// [`Vertex::clone_detached`] with the id of the copy chosen by the caller.
    /// Only the ids nested in templates are drawn from `ids`.
    pub fn clone_as(&self, id: VertexId, ids: &IdCounters) -> Vertex {
        let mut copy = self.clone();
        copy.detach_all_aps();
        copy.symmetry_label = None;
        copy.set_id(id);
        if let VertexBody::Template(template) = &mut copy.body {
            template.refresh_ids(ids);
        }
        copy
    }

    /// The places where this vertex offers something to mutate.
    ///
    /// Capping groups never do. Templates whose inner graph can change hand
    /// out the sites of their inner vertices, other scaffolds offer nothing,
    /// and every other vertex offers itself as long as some mutation type
    /// survives the exclusion.
    pub fn mutation_sites(&self, excluded: &[MutationType]) -> Vec<VertexLocation> {
        if self.bb_type() == BBType::Cap {
            return Vec::new();
        }

        if let VertexBody::Template(template) = &self.body {
            if template.contract_level() != ContractLevel::Fixed {
                let Some(inner) = template.inner_graph() else {
                    return Vec::new();
                };
                return inner
                    .mutable_sites(excluded)
                    .into_iter()
                    .map(|mut site| {
                        site.path.insert(0, self.id);
                        site
                    })
                    .collect();
            }
        }

        if self.bb_type() == BBType::Scaffold || self.allowed_mutations(excluded).is_empty() {
            trace!("Vertex {} offers no mutation site", self.id);
            return Vec::new();
        }
        vec![VertexLocation::top_level(self.id)]
    }
}

impl Display for Vertex {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{}_{}_{}",
            self.id,
            self.building_block.id + 1,
            self.building_block.kind.legacy_int()
        )
    }
}
