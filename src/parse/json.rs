use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::*;

use crate::{
    ApClass, ApRef, AttachmentPoint, BondType, BuildingBlockRef, ContractLevel, DGraph, GraphError,
    GraphId, IdCounters, MutationType, RequiredAp, Result, Template, Vertex, VertexId,
    VertexKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecord {
    graph_id: GraphId,
    #[serde(default)]
    vertices: Vec<VertexRecord>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
    #[serde(default)]
    rings: Vec<RingRecord>,
    #[serde(default)]
    symmetric_sets: Vec<Vec<VertexId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ap_class: Option<ApClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direction: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    atom_position: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VertexRecord {
    vertex_id: VertexId,
    #[serde(rename = "type")]
    kind: VertexKind,
    building_block: BuildingBlockRef,
    #[serde(default)]
    aps: Vec<ApRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    symmetric_aps: Vec<Vec<usize>>,
    #[serde(default)]
    is_rcv: bool,
    mutation_types: Vec<MutationType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    uniquefying_keys: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<TemplateRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateRecord {
    contract_level: ContractLevel,
    #[serde(default)]
    required_aps: Vec<ApRecord>,
    #[serde(default)]
    inner_graph: Option<Box<GraphRecord>>,
    #[serde(default)]
    projections: Vec<ApRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeRecord {
    src: ApRef,
    trg: ApRef,
    bond_type: BondType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RingRecord {
    vertices: Vec<VertexId>,
    bond_type: BondType,
}

impl From<&AttachmentPoint> for ApRecord {
    fn from(ap: &AttachmentPoint) -> Self {
        Self {
            ap_class: ap.class().cloned(),
            direction: ap.direction(),
            atom_position: ap.atom_position(),
        }
    }
}

impl ApRecord {
    fn into_ap(self) -> AttachmentPoint {
        let mut ap = AttachmentPoint::new(self.ap_class);
        if let Some(direction) = self.direction {
            ap = ap.with_direction(direction);
        }
        if let Some(position) = self.atom_position {
            ap = ap.with_atom_position(position);
        }
        ap
    }
}

fn vertex_record(vertex: &Vertex) -> VertexRecord {
    let template = vertex.template().map(|t| TemplateRecord {
        contract_level: t.contract_level(),
        required_aps: t
            .required_aps()
            .iter()
            .map(|r| ApRecord {
                ap_class: r.class.clone(),
                direction: r.direction,
                atom_position: None,
            })
            .collect(),
        inner_graph: t.inner_graph().map(|g| Box::new(graph_record(g))),
        projections: t.projections().to_vec(),
    });
    VertexRecord {
        vertex_id: vertex.id(),
        kind: vertex.kind(),
        building_block: vertex.building_block(),
        aps: vertex.attachment_points().iter().map(ApRecord::from).collect(),
        symmetric_aps: vertex
            .symmetric_aps()
            .iter()
            .map(|s| s.indices().to_vec())
            .collect(),
        is_rcv: vertex.is_ring_closing(),
        mutation_types: vertex.mutation_types().to_vec(),
        properties: vertex.properties().clone(),
        uniquefying_keys: vertex.uniquefying_keys().clone(),
        content: vertex.content().map(str::to_string),
        template,
    }
}

fn graph_record(graph: &DGraph) -> GraphRecord {
    GraphRecord {
        graph_id: graph.id(),
        vertices: graph.vertices().iter().map(vertex_record).collect(),
        edges: graph
            .edges()
            .iter()
            .map(|e| EdgeRecord {
                src: e.src(),
                trg: e.trg(),
                bond_type: e.bond(),
            })
            .collect(),
        rings: graph
            .rings()
            .iter()
            .map(|r| RingRecord {
                vertices: r.vertices().to_vec(),
                bond_type: r.bond(),
            })
            .collect(),
        symmetric_sets: graph
            .symmetric_sets()
            .iter()
            .map(|s| s.ids().to_vec())
            .collect(),
    }
}

fn build_vertex(record: VertexRecord) -> Result<Vertex> {
    let aps: Vec<AttachmentPoint> = record.aps.into_iter().map(ApRecord::into_ap).collect();
    let mut vertex = match (record.kind, record.template) {
        (VertexKind::Template, Some(t)) => {
            let inner = t.inner_graph.map(|g| build_graph(*g)).transpose()?;
            let required = t
                .required_aps
                .into_iter()
                .map(|r| RequiredAp {
                    class: r.ap_class,
                    direction: r.direction,
                })
                .collect();
            let template = Template::restore(t.contract_level, required, inner, t.projections);
            Vertex::restored_template(record.vertex_id, record.building_block, template, aps)?
        }
        (VertexKind::Template, None) => {
            return Err(GraphError::Parse(format!(
                "template vertex {} has no template section",
                record.vertex_id
            )))
        }
        (kind, _) => {
            let mut vertex = match kind {
                VertexKind::MolecularUnit => Vertex::molecular_unit(
                    record.vertex_id,
                    record.building_block,
                    record.content.unwrap_or_default(),
                ),
                _ => {
                    let mut v = Vertex::empty(record.vertex_id);
                    v.set_building_block(record.building_block);
                    v
                }
            };
            for ap in aps {
                vertex.add_ap(ap)?;
            }
            vertex
        }
    };

    for group in record.symmetric_aps {
        vertex.add_symmetric_aps(group)?;
    }
    vertex.set_ring_closing(record.is_rcv);
    vertex.set_mutation_types(record.mutation_types);
    for (key, value) in record.properties {
        if record.uniquefying_keys.contains(&key) {
            vertex.set_uniquefying_property(key, value);
        } else {
            vertex.set_property(key, value);
        }
    }
    Ok(vertex)
}

fn build_graph(record: GraphRecord) -> Result<DGraph> {
    let mut graph = DGraph::with_id(record.graph_id);
    for vertex in record.vertices {
        graph.add_vertex(build_vertex(vertex)?)?;
    }
    for edge in record.edges {
        graph.add_edge(edge.src, edge.trg, edge.bond_type)?;
    }
    for ring in record.rings {
        let (Some(head), Some(tail)) = (ring.vertices.first(), ring.vertices.last()) else {
            return Err(GraphError::Parse("ring without vertices".into()));
        };
        graph.add_ring_with_bond(*head, *tail, ring.bond_type)?;
        if graph.rings().last().map(|r| r.vertices()) != Some(ring.vertices.as_slice()) {
            return Err(GraphError::structural(format!(
                "ring {:?} does not follow the spanning tree",
                ring.vertices
            )));
        }
    }
    for set in record.symmetric_sets {
        graph.add_symmetric_set(set)?;
    }
    Ok(graph)
}

/// Highest graph id used by `graph` or any graph nested in it.
fn max_graph_id(graph: &DGraph) -> GraphId {
    graph
        .vertices()
        .iter()
        .filter_map(Vertex::inner_graph)
        .map(max_graph_id)
        .fold(graph.id(), GraphId::max)
}

/// Read a graph written by [`DGraph::to_json`], nested graphs included.
///
/// The id counters are moved past every vertex and graph id read.
pub fn parse_json(text: &str, ids: &IdCounters) -> Result<DGraph> {
    let record: GraphRecord = serde_json::from_str(text)?;
    let graph = build_graph(record)?;
    if let Some(max) = graph.max_vertex_id() {
        ids.ensure_vertex_ids_above(max)?;
    }
    ids.ensure_graph_ids_above(max_graph_id(&graph))?;
    debug!("Read graph {} with {} vertices from JSON", graph.id(), graph.vertex_count());
    Ok(graph)
}

impl DGraph {
    /// Serialize this graph, nested graphs included, as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&graph_record(self))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BBType, Vertex};

    fn sample() -> DGraph {
        let mut g = DGraph::with_id(4);
        let mut a = Vertex::molecular_unit(1, BuildingBlockRef::new(2, BBType::Scaffold), "c1ccccc1");
        for _ in 0..3 {
            a.add_ap(AttachmentPoint::new(Some("c:0".parse().unwrap())).with_direction([1.0, 0.0, 0.0]))
                .unwrap();
        }
        a.add_symmetric_aps(vec![1, 2]).unwrap();
        let mut b = Vertex::empty(2);
        b.add_ap(AttachmentPoint::new(None)).unwrap();
        b.set_uniquefying_property("label", "x");
        b.set_property("note", "kept");
        let mut c = Vertex::empty(3);
        c.add_ap(AttachmentPoint::new(None)).unwrap();
        c.set_uniquefying_property("label", "x");
        g.add_vertex(a).unwrap();
        g.add_vertex(b).unwrap();
        g.add_vertex(c).unwrap();
        g.add_edge((1, 1).into(), (2, 0).into(), BondType::Single).unwrap();
        g.add_edge((1, 2).into(), (3, 0).into(), BondType::Single).unwrap();
        g.add_symmetric_set([2, 3]).unwrap();
        g
    }

    #[test]
    fn test_json_keeps_vertex_details() {
        let ids = IdCounters::new();
        let g = sample();
        let text = g.to_json().unwrap();
        assert!(text.contains("\"graphId\": 4"));
        assert!(text.contains("\"MolecularFragment\""));
        let back = parse_json(&text, &ids).unwrap();
        assert!(back.is_isomorphic_to(&g));
        let b = back.vertex(2).unwrap();
        assert_eq!(b.property("note"), Some("kept"));
        assert!(b.uniquefying_keys().contains("label"));
        assert!(!b.uniquefying_keys().contains("note"));
        let a = back.vertex(1).unwrap();
        assert_eq!(a.content(), Some("c1ccccc1"));
        assert_eq!(a.ap(0).unwrap().direction(), Some([1.0, 0.0, 0.0]));
        assert_eq!(a.symmetric_aps().len(), 1);
        assert_eq!(ids.current_vertex_index(), 4);
        assert_eq!(ids.current_graph_index(), 5);
    }

    #[test]
    fn test_json_nested_template() {
        let ids = IdCounters::new();
        let mut inner = DGraph::with_id(20);
        let mut x = Vertex::molecular_unit(11, BuildingBlockRef::new(0, BBType::Fragment), "C");
        x.add_ap(AttachmentPoint::new(Some("a:0".parse().unwrap()))).unwrap();
        x.add_ap(AttachmentPoint::new(Some("a:1".parse().unwrap()))).unwrap();
        inner.add_vertex(x).unwrap();
        let mut t = Vertex::new_template(10, BuildingBlockRef::new(1, BBType::Scaffold), ContractLevel::Fixed);
        t.add_required_ap(Some("a:1".parse().unwrap()), None).unwrap();
        t.set_inner_graph(inner).unwrap();

        let mut g = DGraph::with_id(21);
        g.add_vertex(t).unwrap();
        let back = parse_json(&g.to_json().unwrap(), &ids).unwrap();
        let t = back.vertex(10).unwrap();
        assert_eq!(t.kind(), VertexKind::Template);
        assert_eq!(t.ap_count(), 2);
        assert_eq!(t.inner_ap_of(1), Some(ApRef::new(11, 1)));
        assert_eq!(t.inner_graph().unwrap().jacket(), Some(10));
        assert_eq!(t.template().unwrap().contract_level(), ContractLevel::Fixed);
        assert!(back.is_isomorphic_to(&g));
        assert_eq!(ids.current_graph_index(), 22);
        assert_eq!(ids.current_vertex_index(), 12);
    }

    #[test]
    fn test_json_rejects_bad_projection() {
        let ids = IdCounters::new();
        let text = r#"{
            "graphId": 1,
            "vertices": [{
                "vertexId": 5, "type": "Template",
                "buildingBlock": {"id": 0, "kind": "SCAFFOLD"},
                "aps": [{}], "mutationTypes": [],
                "template": {
                    "contractLevel": "FREE",
                    "innerGraph": {"graphId": 2, "vertices": [], "edges": []},
                    "projections": [{"vertex": 9, "index": 0}]
                }
            }]
        }"#;
        assert!(matches!(
            parse_json(text, &ids),
            Err(GraphError::StructuralInconsistency(_))
        ));
        assert!(matches!(parse_json("{not json", &ids), Err(GraphError::Json(_))));
    }

    #[test]
    fn test_json_rejects_last_vertex_id() {
        let ids = IdCounters::new();
        let text = r#"{
            "graphId": 1,
            "vertices": [{
                "vertexId": 18446744073709551615, "type": "MolecularFragment",
                "buildingBlock": {"id": 0, "kind": "FRAGMENT"},
                "aps": [], "mutationTypes": []
            }]
        }"#;
        assert!(matches!(
            parse_json(text, &ids),
            Err(GraphError::IdsExhausted { counter: "vertex", .. })
        ));
        assert_eq!(ids.current_vertex_index(), 1);
    }
}
