use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ap::{ApClass, ApRef, EdgeId};
use crate::{GraphError, Result, VertexId};

/// Connection class carried by an edge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BondType {
    None,
    #[default]
    Undefined,
    Any,
    Single,
    Double,
    Triple,
    Quadruple,
}

impl BondType {
    pub const ALL: [BondType; 7] = [
        BondType::None,
        BondType::Undefined,
        BondType::Any,
        BondType::Single,
        BondType::Double,
        BondType::Triple,
        BondType::Quadruple,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BondType::None => "NONE",
            BondType::Undefined => "UNDEFINED",
            BondType::Any => "ANY",
            BondType::Single => "SINGLE",
            BondType::Double => "DOUBLE",
            BondType::Triple => "TRIPLE",
            BondType::Quadruple => "QUADRUPLE",
        }
    }

    /// Bond multiplicity, when the connection is an actual bond.
    pub fn order(&self) -> Option<u8> {
        match self {
            BondType::Single => Some(1),
            BondType::Double => Some(2),
            BondType::Triple => Some(3),
            BondType::Quadruple => Some(4),
            _ => None,
        }
    }

    pub fn is_bond(&self) -> bool {
        self.order().is_some()
    }
}

impl Display for BondType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BondType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        BondType::ALL
            .iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| GraphError::Parse(format!("unknown bond type '{s}'")))
    }
}

/// A directed connection from a source AP to a target AP.
///
/// The direction follows the spanning tree of the graph: the source vertex is
/// the parent of the target vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    id: EdgeId,
    src: ApRef,
    trg: ApRef,
    bond: BondType,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, src: ApRef, trg: ApRef, bond: BondType) -> Self {
        Self { id, src, trg, bond }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn src(&self) -> ApRef {
        self.src
    }

    pub fn trg(&self) -> ApRef {
        self.trg
    }

    pub fn src_vertex(&self) -> VertexId {
        self.src.vertex
    }

    pub fn trg_vertex(&self) -> VertexId {
        self.trg.vertex
    }

    pub fn bond(&self) -> BondType {
        self.bond
    }

    pub fn involves(&self, vertex: VertexId) -> bool {
        self.src.vertex == vertex || self.trg.vertex == vertex
    }

    pub fn uses(&self, ap: ApRef) -> bool {
        self.src == ap || self.trg == ap
    }

    /// The AP at the other end of the edge, if `ap` is one of its ends.
    pub fn other_end(&self, ap: ApRef) -> Option<ApRef> {
        if self.src == ap {
            Some(self.trg)
        } else if self.trg == ap {
            Some(self.src)
        } else {
            None
        }
    }

    pub(crate) fn remap_vertices(&mut self, map: impl Fn(VertexId) -> VertexId) {
        self.src.vertex = map(self.src.vertex);
        self.trg.vertex = map(self.trg.vertex);
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.src.vertex, self.src.index, self.trg.vertex, self.trg.index, self.bond
        )
    }
}

/// One end of an edge reduced to the properties that do not depend on ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeEnd {
    pub bb_precedence: i32,
    pub bb_id: usize,
    pub atom_position: Option<usize>,
    pub class: Option<ApClass>,
    pub ap_index: usize,
}

/// An edge compared as an undirected relation.
///
/// Ends are stored sorted, so two edges that connect the same kind of APs in
/// opposite directions compare equal. Ordering ranks first by the ends
/// (building-block type precedence, then AP order), then by bond type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UndirectedEdge {
    ends: [EdgeEnd; 2],
    bond: BondType,
}

impl UndirectedEdge {
    pub fn new(a: EdgeEnd, b: EdgeEnd, bond: BondType) -> Self {
        let ends = if a <= b { [a, b] } else { [b, a] };
        Self { ends, bond }
    }

    pub fn ends(&self) -> &[EdgeEnd; 2] {
        &self.ends
    }

    pub fn bond(&self) -> BondType {
        self.bond
    }
}
