use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::intern::RuleName;
use crate::{GraphError, Result, VertexId};

/// Per-graph identifier of an edge, stored in the AP the edge uses.
pub type EdgeId = u64;

/// Rules of the AP classes that mark ring-closing attachment points.
pub const RING_CLOSING_RULES: [&str; 3] = ["ATplus", "ATminus", "ATneutral"];

/// Connection class of an attachment point, written `rule:subClass`.
///
/// The compatibility between classes is decided outside of the graph engine,
/// here a class is only an ordered, comparable tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApClass {
    rule: RuleName,
    sub_class: u32,
}

impl ApClass {
    pub fn new(rule: &str, sub_class: u32) -> Result<Self> {
        let valid = !rule.is_empty()
            && rule
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(GraphError::Parse(format!("invalid AP class rule '{rule}'")));
        }
        Ok(Self {
            rule: RuleName::new(rule),
            sub_class,
        })
    }

    pub fn rule(&self) -> &str {
        self.rule.as_str()
    }

    pub fn sub_class(&self) -> u32 {
        self.sub_class
    }

    /// True for the classes of ring-closing attachment points.
    pub fn is_ring_closing(&self) -> bool {
        self.sub_class == 0 && RING_CLOSING_RULES.contains(&self.rule.as_str())
    }

    pub fn ring_closing_plus() -> Self {
        Self {
            rule: RuleName::new(RING_CLOSING_RULES[0]),
            sub_class: 0,
        }
    }

    pub fn ring_closing_minus() -> Self {
        Self {
            rule: RuleName::new(RING_CLOSING_RULES[1]),
            sub_class: 0,
        }
    }

    pub fn ring_closing_neutral() -> Self {
        Self {
            rule: RuleName::new(RING_CLOSING_RULES[2]),
            sub_class: 0,
        }
    }
}

impl Display for ApClass {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}:{}", self.rule, self.sub_class)
    }
}

impl FromStr for ApClass {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let (rule, sub) = s
            .split_once(':')
            .ok_or_else(|| GraphError::Parse(format!("AP class '{s}' is not of the form rule:subClass")))?;
        let sub_class = sub
            .parse::<u32>()
            .map_err(|_| GraphError::Parse(format!("AP class '{s}' has a non-numeric subclass")))?;
        ApClass::new(rule, sub_class)
    }
}

impl TryFrom<String> for ApClass {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ApClass> for String {
    fn from(class: ApClass) -> Self {
        class.to_string()
    }
}

/// Address of an attachment point inside one graph: the owning vertex and the
/// position of the AP in that vertex's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApRef {
    pub vertex: VertexId,
    pub index: usize,
}

impl ApRef {
    pub fn new(vertex: VertexId, index: usize) -> Self {
        Self { vertex, index }
    }
}

impl From<(VertexId, usize)> for ApRef {
    fn from((vertex, index): (VertexId, usize)) -> Self {
        Self { vertex, index }
    }
}

impl Display for ApRef {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "AP{}@v{}", self.index, self.vertex)
    }
}

/// Address of an attachment point at any nesting depth.
///
/// `path` lists the template vertices to walk through, starting from the
/// outermost graph; an empty path means the outermost graph itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApLocation {
    pub path: Vec<VertexId>,
    pub ap: ApRef,
}

impl ApLocation {
    pub fn new(path: Vec<VertexId>, ap: ApRef) -> Self {
        Self { path, ap }
    }

    pub fn top_level(ap: ApRef) -> Self {
        Self { path: Vec::new(), ap }
    }
}

/// A connection slot of a vertex.
///
/// An AP is either available or used by exactly one edge of the graph that owns
/// its vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPoint {
    class: Option<ApClass>,
    direction: Option<[f64; 3]>,
    atom_position: Option<usize>,
    user: Option<EdgeId>,
}

impl AttachmentPoint {
    pub fn new(class: Option<ApClass>) -> Self {
        Self {
            class,
            direction: None,
            atom_position: None,
            user: None,
        }
    }

    pub fn with_direction(mut self, direction: [f64; 3]) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Set the position, within the building block's content, of the atom or
    /// locus this AP sprouts from.
    pub fn with_atom_position(mut self, position: usize) -> Self {
        self.atom_position = Some(position);
        self
    }

    pub fn class(&self) -> Option<&ApClass> {
        self.class.as_ref()
    }

    pub fn set_class(&mut self, class: Option<ApClass>) {
        self.class = class;
    }

    pub fn direction(&self) -> Option<[f64; 3]> {
        self.direction
    }

    pub fn atom_position(&self) -> Option<usize> {
        self.atom_position
    }

    pub fn is_available(&self) -> bool {
        self.user.is_none()
    }

    /// The edge using this AP, if any.
    pub fn user(&self) -> Option<EdgeId> {
        self.user
    }

    pub fn bind(&mut self, edge: EdgeId) -> Result<()> {
        if let Some(current) = self.user {
            return Err(GraphError::structural(format!(
                "AP already used by edge {current}, cannot bind it to edge {edge}"
            )));
        }
        self.user = Some(edge);
        Ok(())
    }

    pub fn unbind(&mut self) -> Result<EdgeId> {
        self.user
            .take()
            .ok_or_else(|| GraphError::structural("cannot unbind an AP that is not used by any edge"))
    }

    /// A copy with the same properties and no edge.
    pub fn detached(&self) -> Self {
        Self {
            user: None,
            ..self.clone()
        }
    }

    /// Equality of the properties that survive cloning: source locus and class.
    pub fn same_as(&self, other: &AttachmentPoint) -> bool {
        self.atom_position == other.atom_position && self.class == other.class
    }

    /// Order by source locus, then class, then direction.
    pub fn compare_properties(&self, other: &AttachmentPoint) -> Ordering {
        self.atom_position
            .cmp(&other.atom_position)
            .then_with(|| self.class.cmp(&other.class))
            .then_with(|| compare_directions(self.direction, other.direction))
    }
}

fn compare_directions(a: Option<[f64; 3]>, b: Option<[f64; 3]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ap_class() {
        let class: ApClass = "amine:2".parse().unwrap();
        assert_eq!(class.rule(), "amine");
        assert_eq!(class.sub_class(), 2);
        assert_eq!(class.to_string(), "amine:2");
        assert!("amine".parse::<ApClass>().is_err());
        assert!("ami ne:1".parse::<ApClass>().is_err());
        assert!("amine:x".parse::<ApClass>().is_err());
    }

    #[test]
    fn test_ring_closing_classes() {
        assert!(ApClass::ring_closing_plus().is_ring_closing());
        assert!("ATneutral:0".parse::<ApClass>().unwrap().is_ring_closing());
        assert!(!"ATneutral:1".parse::<ApClass>().unwrap().is_ring_closing());
        assert!(!"C:0".parse::<ApClass>().unwrap().is_ring_closing());
    }

    #[test]
    fn test_class_order() {
        let a: ApClass = "a:5".parse().unwrap();
        let b: ApClass = "a:10".parse().unwrap();
        let c: ApClass = "b:0".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut ap = AttachmentPoint::new(None);
        assert!(ap.is_available());
        ap.bind(7).unwrap();
        assert!(!ap.is_available());
        assert!(ap.bind(8).is_err());
        assert_eq!(ap.unbind().unwrap(), 7);
        assert!(ap.unbind().is_err());
    }

    #[test]
    fn test_detached_copy_keeps_properties() {
        let mut ap = AttachmentPoint::new(Some("x:1".parse().unwrap()))
            .with_direction([1.0, 0.0, 0.0])
            .with_atom_position(3);
        ap.bind(1).unwrap();
        let copy = ap.detached();
        assert!(copy.is_available());
        assert!(copy.same_as(&ap));
        assert_eq!(copy.direction(), Some([1.0, 0.0, 0.0]));
        assert_eq!(copy.compare_properties(&ap), Ordering::Equal);
    }
}
