//! The compact one-line graph format:
//!
//! `<graph id> <vertex>,<vertex>,..., <edge>,<edge>,..., Ring [vertices=[..]] SymmetricSet [ids=[..]]`
//!
//! A vertex is `id_bb_type` with a 1-based building-block id and the integer
//! code of its building-block type. An edge is
//! `srcVertex_srcAp_trgVertex_trgAp_BOND`, optionally followed by
//! `_srcClass_trgClass`. Nested graphs of templates are not written.

use std::fmt::Write as FmtWrite;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{alphanumeric1, char, digit1, i32 as parse_i32, multispace0, multispace1, u64 as parse_u64},
    combinator::{all_consuming, map, opt, peek, recognize},
    error::{convert_error, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use tracing::*;

use crate::library::BuildingBlockLibrary;
use crate::{
    ApClass, ApRef, AttachmentPoint, BBType, BondType, BuildingBlockRef, DGraph, GraphError, GraphId,
    IdCounters, Result, Vertex, VertexId,
};

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, PartialEq)]
struct LegacyVertex {
    id: VertexId,
    bb: u64,
    bb_type: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct LegacyEdge {
    src: ApRef,
    trg: ApRef,
    bond: String,
    classes: Option<(Option<String>, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
struct LegacyGraph {
    id: GraphId,
    vertices: Vec<LegacyVertex>,
    edges: Vec<LegacyEdge>,
    rings: Vec<Vec<VertexId>>,
    symmetric_sets: Vec<Vec<VertexId>>,
}

fn parse_vertex(input: &str) -> Res<LegacyVertex> {
    let (input, (id, _, bb, _, bb_type)) =
        tuple((parse_u64, char('_'), parse_u64, char('_'), parse_i32))(input)?;
    Ok((input, LegacyVertex { id, bb, bb_type }))
}

/// `-` stands for an AP without class.
fn parse_src_class(input: &str) -> Res<Option<String>> {
    alt((
        map(terminated(tag("-"), peek(char('_'))), |_| None),
        map(
            recognize(tuple((take_while1(|c: char| c != ':'), char(':'), digit1))),
            |s: &str| Some(s.to_string()),
        ),
    ))(input)
}

fn parse_trg_class(input: &str) -> Res<Option<String>> {
    map(take_while1(|c: char| c != ',' && !c.is_whitespace()), |s: &str| {
        (s != "-").then(|| s.to_string())
    })(input)
}

fn parse_edge(input: &str) -> Res<LegacyEdge> {
    let (input, (src_vertex, _, src_ap, _, trg_vertex, _, trg_ap, _, bond)) = tuple((
        parse_u64,
        char('_'),
        parse_u64,
        char('_'),
        parse_u64,
        char('_'),
        parse_u64,
        char('_'),
        alphanumeric1,
    ))(input)?;
    let (input, classes) = opt(tuple((
        preceded(char('_'), parse_src_class),
        preceded(char('_'), parse_trg_class),
    )))(input)?;
    Ok((
        input,
        LegacyEdge {
            src: ApRef::new(src_vertex, src_ap as usize),
            trg: ApRef::new(trg_vertex, trg_ap as usize),
            bond: bond.to_string(),
            classes,
        },
    ))
}

/// A bracketed list after `key=`, as in `[vertices=[1_1_1, 2_1_1]]`.
fn parse_id_list(input: &str) -> Res<Vec<VertexId>> {
    let member = terminated(parse_u64, take_while(|c: char| c != ',' && c != ']'));
    delimited(
        tuple((char('['), take_while1(|c: char| c.is_alphanumeric()), char('='), char('['))),
        separated_list0(tuple((char(','), multispace0)), member),
        tuple((char(']'), char(']'))),
    )(input)
}

fn parse_ring(input: &str) -> Res<Vec<VertexId>> {
    preceded(tuple((tag("Ring"), multispace1)), parse_id_list)(input)
}

fn parse_symmetric_set(input: &str) -> Res<Vec<VertexId>> {
    preceded(tuple((tag("SymmetricSet"), multispace1)), parse_id_list)(input)
}

fn parse_graph(input: &str) -> Res<LegacyGraph> {
    let (input, id) = preceded(multispace0, parse_u64)(input)?;
    let (input, vertices) = preceded(multispace0, many0(terminated(parse_vertex, char(','))))(input)?;
    let (input, edges) = preceded(multispace0, many0(terminated(parse_edge, char(','))))(input)?;
    let (input, rings) = preceded(multispace0, many0(terminated(parse_ring, multispace0)))(input)?;
    let (input, symmetric_sets) = many0(terminated(parse_symmetric_set, multispace0))(input)?;
    Ok((
        input,
        LegacyGraph {
            id,
            vertices,
            edges,
            rings,
            symmetric_sets,
        },
    ))
}

fn parse_text(text: &str) -> Result<LegacyGraph> {
    let trimmed = text.trim();
    match all_consuming(parse_graph)(trimmed) {
        Ok((_, graph)) => Ok(graph),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(GraphError::Parse(convert_error(trimmed, e)))
        }
        Err(nom::Err::Incomplete(_)) => Err(GraphError::Parse("incomplete graph string".into())),
    }
}

/// Give `vertex` an AP at `index`, creating placeholders when no library tells
/// how many APs it really has.
fn ensure_ap(vertex: &mut Vertex, index: usize, from_library: bool) -> Result<()> {
    if index < vertex.ap_count() {
        return Ok(());
    }
    if from_library {
        return Err(GraphError::structural(format!(
            "vertex {} has {} APs, AP {index} is out of range",
            vertex.id(),
            vertex.ap_count()
        )));
    }
    while vertex.ap_count() <= index {
        vertex.add_ap(AttachmentPoint::new(None))?;
    }
    Ok(())
}

fn set_class(vertex: &mut Vertex, index: usize, class: &Option<String>) -> Result<()> {
    if let Some(class) = class {
        let class: ApClass = class.parse()?;
        if let Some(ap) = vertex.ap_mut(index) {
            ap.set_class(Some(class));
        }
    }
    Ok(())
}

/// Read a graph written by [`DGraph::to_legacy_string`].
///
/// With a library, vertices are rebuilt from their building blocks and AP
/// indices are checked against them. Without one, every vertex is an empty
/// placeholder with as many APs as its edges need, and ring ends are marked
/// as ring-closing vertices. The id counters are moved past the ids read.
pub fn parse_legacy(
    text: &str,
    library: Option<&dyn BuildingBlockLibrary>,
    ids: &IdCounters,
) -> Result<DGraph> {
    let parsed = parse_text(text)?;
    debug!(
        "Read legacy graph {} with {} vertices and {} edges",
        parsed.id,
        parsed.vertices.len(),
        parsed.edges.len()
    );

    // graphs nested in library templates draw ids above the ones read here
    if let Some(max) = parsed.vertices.iter().map(|v| v.id).max() {
        ids.ensure_vertex_ids_above(max)?;
    }
    ids.ensure_graph_ids_above(parsed.id)?;

    let mut vertices = Vec::with_capacity(parsed.vertices.len());
    for v in &parsed.vertices {
        let bb_id = v.bb.checked_sub(1).ok_or_else(|| {
            GraphError::Parse(format!("vertex {} has building-block id 0, ids start at 1", v.id))
        })?;
        let bb = BuildingBlockRef::new(bb_id as usize, BBType::from_legacy_int(v.bb_type));
        let vertex = match library {
            Some(library) => library.make_vertex(bb, v.id, ids)?,
            None => {
                let mut vertex = Vertex::empty(v.id);
                vertex.set_building_block(bb);
                vertex
            }
        };
        vertices.push(vertex);
    }

    let mut bonds = Vec::with_capacity(parsed.edges.len());
    for edge in &parsed.edges {
        let bond: BondType = edge.bond.parse()?;
        for (end, class) in [
            (edge.src, edge.classes.as_ref().map(|c| &c.0)),
            (edge.trg, edge.classes.as_ref().map(|c| &c.1)),
        ] {
            let vertex = vertices.iter_mut().find(|v| v.id() == end.vertex).ok_or_else(|| {
                GraphError::structural(format!("edge refers to unknown vertex {}", end.vertex))
            })?;
            ensure_ap(vertex, end.index, library.is_some())?;
            if let Some(class) = class {
                set_class(vertex, end.index, class)?;
            }
        }
        bonds.push(bond);
    }

    if library.is_none() {
        for vertex in vertices.iter_mut() {
            let closes_ring = parsed
                .rings
                .iter()
                .any(|r| r.first() == Some(&vertex.id()) || r.last() == Some(&vertex.id()));
            if closes_ring || vertex.has_ring_closing_aps() {
                vertex.set_ring_closing(true);
            }
        }
    }

    let mut graph = DGraph::with_id(parsed.id);
    for vertex in vertices {
        graph.add_vertex(vertex)?;
    }
    for (edge, bond) in parsed.edges.iter().zip(bonds) {
        graph.add_edge(edge.src, edge.trg, bond)?;
    }
    for members in &parsed.rings {
        let (Some(head), Some(tail)) = (members.first(), members.last()) else {
            return Err(GraphError::Parse("ring without vertices".into()));
        };
        let bond = graph.edges_of(*head).first().map(|e| e.bond()).unwrap_or_default();
        graph.add_ring_with_bond(*head, *tail, bond)?;
        let stored = graph.rings().last().map(|r| r.vertices().to_vec());
        if stored.as_ref() != Some(members) {
            return Err(GraphError::structural(format!(
                "ring {members:?} does not follow the spanning tree, expected {stored:?}"
            )));
        }
    }
    for members in &parsed.symmetric_sets {
        graph.add_symmetric_set(members.iter().copied())?;
    }

    Ok(graph)
}

fn write_class(class: Option<&ApClass>) -> String {
    class.map(ApClass::to_string).unwrap_or_else(|| "-".to_string())
}

impl DGraph {
    /// Write this graph in the compact one-line format read by [`parse_legacy`].
    pub fn to_legacy_string(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{} ", self.id());
        for vertex in self.vertices() {
            let _ = write!(out, "{vertex},");
        }
        out.push(' ');
        for edge in self.edges() {
            let _ = write!(out, "{edge}");
            let src = self.ap(edge.src()).and_then(AttachmentPoint::class);
            let trg = self.ap(edge.trg()).and_then(AttachmentPoint::class);
            if src.is_some() || trg.is_some() {
                let _ = write!(out, "_{}_{}", write_class(src), write_class(trg));
            }
            out.push(',');
        }
        out.push(' ');
        for ring in self.rings() {
            let members: Vec<String> = ring
                .vertices()
                .iter()
                .map(|id| match self.vertex(*id) {
                    Some(v) => v.to_string(),
                    None => id.to_string(),
                })
                .collect();
            let _ = write!(out, "Ring [vertices=[{}]] ", members.join(", "));
        }
        for set in self.symmetric_sets() {
            let members: Vec<String> = set.ids().iter().map(VertexId::to_string).collect();
            let _ = write!(out, "SymmetricSet [ids=[{}]] ", members.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryLibrary;

    #[test]
    fn test_parse_edge_with_classes() {
        let (rest, edge) = parse_edge("853_1_855_0_SINGLE_c:0_ATneutral:0,").unwrap();
        assert_eq!(rest, ",");
        assert_eq!(edge.src, ApRef::new(853, 1));
        assert_eq!(edge.trg, ApRef::new(855, 0));
        assert_eq!(
            edge.classes,
            Some((Some("c:0".to_string()), Some("ATneutral:0".to_string())))
        );

        let (_, edge) = parse_edge("1_0_2_0_DOUBLE_-_my_rule:2,").unwrap();
        assert_eq!(edge.classes, Some((None, Some("my_rule:2".to_string()))));
        let (_, edge) = parse_edge("1_0_2_0_DOUBLE,").unwrap();
        assert_eq!(edge.classes, None);
    }

    #[test]
    fn test_read_without_library() {
        let ids = IdCounters::new();
        let text = "7 1_1_0,2_2_1,3_3_1,4_1_-1,5_1_-1, 1_0_2_0_SINGLE,2_1_3_0_SINGLE,3_1_4_0_SINGLE_a:0_ATplus:0,1_1_5_0_SINGLE, Ring [vertices=[4_1_-1, 3_3_1, 2_2_1, 1_1_0, 5_1_-1]] SymmetricSet [ids=[2, 3]] ";
        let g = parse_legacy(text, None, &ids).unwrap();
        assert_eq!(g.id(), 7);
        assert_eq!(g.vertex_count(), 5);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.ring_count(), 1);
        assert_eq!(g.symmetric_set_count(), 1);
        assert!(g.vertex(4).unwrap().is_ring_closing());
        assert_eq!(g.vertex(2).unwrap().building_block(), BuildingBlockRef::new(1, BBType::Fragment));
        assert_eq!(g.vertex(3).unwrap().ap_count(), 2);
        assert_eq!(
            g.vertex(3).unwrap().ap(1).unwrap().class().map(ApClass::to_string),
            Some("a:0".to_string())
        );
        g.check_consistency().unwrap();
        assert_eq!(ids.current_vertex_index(), 6);
        assert_eq!(ids.current_graph_index(), 8);
    }

    #[test]
    fn test_written_text_reads_back() {
        let ids = IdCounters::new();
        let text = "3 1_1_0,2_2_1, 1_0_2_0_SINGLE,";
        let g = parse_legacy(text, None, &ids).unwrap();
        assert_eq!(g.to_legacy_string(), "3 1_1_0,2_2_1, 1_0_2_0_SINGLE, ");
        let again = parse_legacy(&g.to_legacy_string(), None, &ids).unwrap();
        assert!(g.is_isomorphic_to(&again));
    }

    #[test]
    fn test_library_checks_ap_count() {
        let ids = IdCounters::new();
        let mut lib = InMemoryLibrary::permissive();
        let mut one_ap = Vertex::empty(0);
        one_ap.add_ap(AttachmentPoint::new(None)).unwrap();
        lib.add_building_block(BBType::Fragment, one_ap.clone());
        lib.add_building_block(BBType::Fragment, one_ap);
        let ok = parse_legacy("1 1_1_1,2_2_1, 1_0_2_0_SINGLE,", Some(&lib), &ids).unwrap();
        assert_eq!(ok.vertex(1).unwrap().ap_count(), 1);
        let bad = parse_legacy("1 1_1_1,2_2_1, 1_3_2_0_SINGLE,", Some(&lib), &ids);
        assert!(matches!(bad, Err(GraphError::StructuralInconsistency(_))));
    }

    #[test]
    fn test_malformed_text() {
        let ids = IdCounters::new();
        assert!(matches!(parse_legacy("x 1_1_1,", None, &ids), Err(GraphError::Parse(_))));
        assert!(matches!(
            parse_legacy("1 1_0_1,", None, &ids),
            Err(GraphError::Parse(_))
        ));
        assert!(parse_legacy("1 1_1_1, 1_0_9_0_SINGLE,", None, &ids).is_err());
    }

    #[test]
    fn test_empty_graph() {
        let ids = IdCounters::new();
        let g = parse_legacy("12   ", None, &ids).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.to_legacy_string(), "12   ");
    }
}
