use std::collections::{BTreeMap, BTreeSet};

use anyhow::bail;
use tracing::*;

use crate::{ApClass, BBType, BondType, BuildingBlockRef, IdCounters, Vertex, VertexId};

/// Decides which AP classes may be linked, and with what bond.
pub trait ApCompatibility {
    /// The bond resulting from linking an AP of class `src` (parent side) to an
    /// AP of class `trg`, or `None` if the two cannot be linked.
    fn connection(&self, src: Option<&ApClass>, trg: Option<&ApClass>) -> Option<BondType>;

    fn is_compatible(&self, src: Option<&ApClass>, trg: Option<&ApClass>) -> bool {
        self.connection(src, trg).is_some()
    }
}

/// Compatibility that accepts every pair of classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyCompatibility;

impl ApCompatibility for AnyCompatibility {
    fn connection(&self, _src: Option<&ApClass>, _trg: Option<&ApClass>) -> Option<BondType> {
        Some(BondType::Undefined)
    }
}

/// Compatibility given as an explicit table of allowed class pairs, plus the
/// bond type each rule forms.
///
/// APs without class are placeholders and are compatible with anything.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityMatrix {
    allowed: BTreeMap<ApClass, BTreeSet<ApClass>>,
    bonds: BTreeMap<String, BondType>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, src: ApClass, trg: ApClass) {
        self.allowed.entry(src).or_default().insert(trg);
    }

    pub fn set_bond(&mut self, rule: &str, bond: BondType) {
        self.bonds.insert(rule.to_string(), bond);
    }
}

impl ApCompatibility for CompatibilityMatrix {
    fn connection(&self, src: Option<&ApClass>, trg: Option<&ApClass>) -> Option<BondType> {
        match (src, trg) {
            (Some(src), Some(trg)) => {
                if self.allowed.get(src).map(|t| t.contains(trg)).unwrap_or(false) {
                    Some(self.bonds.get(src.rule()).copied().unwrap_or_default())
                } else {
                    None
                }
            }
            _ => Some(BondType::Undefined),
        }
    }
}

/// Source of building blocks.
pub trait BuildingBlockLibrary {
    /// A new vertex with id `id` built from the block `bb`, with all of its
    /// APs available. Vertices and graphs nested in a template block get
    /// fresh ids from `ids`.
    fn make_vertex(&self, bb: BuildingBlockRef, id: VertexId, ids: &IdCounters) -> anyhow::Result<Vertex>;

    fn compatibility(&self) -> &dyn ApCompatibility;
}

/// A library kept in memory, with blocks numbered per type in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    blocks: BTreeMap<BBType, Vec<Vertex>>,
    compatibility: CompatibilityMatrix,
    permissive: bool,
}

impl InMemoryLibrary {
    /// A library whose compatibility accepts every pair of classes.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn with_compatibility(compatibility: CompatibilityMatrix) -> Self {
        Self {
            compatibility,
            ..Self::default()
        }
    }

    /// Store a prototype vertex and return the reference to it. Ring-closing
    /// status is derived from the APs of the prototype.
    pub fn add_building_block(&mut self, kind: BBType, mut prototype: Vertex) -> BuildingBlockRef {
        let list = self.blocks.entry(kind).or_default();
        let bb = BuildingBlockRef::new(list.len(), kind);
        prototype.set_building_block(bb);
        if prototype.has_ring_closing_aps() {
            prototype.set_ring_closing(true);
        }
        debug!("Library stores building block {:?}", bb);
        list.push(prototype);
        bb
    }

    pub fn len(&self, kind: BBType) -> usize {
        self.blocks.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.values().all(Vec::is_empty)
    }
}

impl BuildingBlockLibrary for InMemoryLibrary {
    fn make_vertex(&self, bb: BuildingBlockRef, id: VertexId, ids: &IdCounters) -> anyhow::Result<Vertex> {
        let Some(prototype) = self.blocks.get(&bb.kind).and_then(|list| list.get(bb.id)) else {
            bail!("no building block {} of type {:?} in the library", bb.id, bb.kind);
        };
        Ok(prototype.clone_as(id, ids))
    }

    fn compatibility(&self) -> &dyn ApCompatibility {
        if self.permissive {
            &AnyCompatibility
        } else {
            &self.compatibility
        }
    }
}
