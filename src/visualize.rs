use std::fmt::Write as FmtWrite;
use std::io::Write;

use tracing::*;

use crate::{BBType, BondType, DGraph, Result, Vertex, VertexBody};

impl DGraph {
    /// Exports the graph to the Graphviz DOT format.
    ///
    /// Tree edges are drawn as arrows from the parent AP to the child AP,
    /// ring chords as dashed lines between the ring ends. Graphs nested in
    /// templates are drawn as clusters inside the template.
    pub fn to_dot(&self) -> String {
        let mut dot_output = String::new();
        let _ = writeln!(dot_output, "digraph G{} {{", self.id());
        let _ = writeln!(dot_output, "    rankdir=LR;");
        write_body(&mut dot_output, self, "", 1);
        let _ = writeln!(dot_output, "}}");
        dot_output
    }

    /// Saves the DOT export to `output_dot`.
    pub fn save_dot(&self, output_dot: &str) -> Result<()> {
        let mut file = std::fs::File::create(output_dot)?;
        file.write_all(self.to_dot().as_bytes())?;
        info!("DOT file for graph {} saved to {}", self.id(), output_dot);
        Ok(())
    }
}

/// Writes the statements of one graph. `prefix` keeps node names unique
/// across nesting levels.
fn write_body(out: &mut String, graph: &DGraph, prefix: &str, depth: usize) {
    let indent = "    ".repeat(depth);

    for vertex in graph.vertices() {
        let name = node_name(prefix, vertex.id());
        let (shape, color) = vertex_style(vertex);
        let _ = writeln!(
            out,
            "{indent}{name} [label=\"{}\", shape={shape}, style=filled, fillcolor={color}];",
            vertex_label(vertex),
        );

        if let VertexBody::Template(template) = vertex.body() {
            if let Some(inner) = template.inner_graph() {
                let inner_prefix = format!("{prefix}t{}_", vertex.id());
                let _ = writeln!(out, "{indent}subgraph cluster_{inner_prefix} {{");
                let _ = writeln!(out, "{indent}    label=\"graph {}\";", inner.id());
                write_body(out, inner, &inner_prefix, depth + 1);
                let _ = writeln!(out, "{indent}}}");
            }
        }
    }

    for edge in graph.edges() {
        let _ = writeln!(
            out,
            "{indent}{} -> {} [label=\"{}:{}\", penwidth={}];",
            node_name(prefix, edge.src_vertex()),
            node_name(prefix, edge.trg_vertex()),
            edge.src().index,
            edge.trg().index,
            bond_width(edge.bond()),
        );
    }

    for ring in graph.rings() {
        if let (Some(head), Some(tail)) = (ring.head(), ring.tail()) {
            let _ = writeln!(
                out,
                "{indent}{} -> {} [style=dashed, dir=none, color=purple, label=\"{}\"];",
                node_name(prefix, head),
                node_name(prefix, tail),
                ring.bond(),
            );
        }
    }

    for (i, set) in graph.symmetric_sets().iter().enumerate() {
        let members: Vec<String> = set.ids().iter().map(|id| node_name(prefix, *id)).collect();
        let _ = writeln!(out, "{indent}// symmetric set {i}: {}", members.join(" "));
    }
}

fn node_name(prefix: &str, vertex: u64) -> String {
    format!("{prefix}v{vertex}")
}

fn vertex_label(vertex: &Vertex) -> String {
    match vertex.body() {
        VertexBody::Empty => format!("{} (empty)", vertex.id()),
        VertexBody::MolecularUnit { content } if !content.is_empty() => {
            format!("{}\\n{}", vertex, content)
        }
        _ => vertex.to_string(),
    }
}

/// Node shape and fill color per vertex variant and block type.
fn vertex_style(vertex: &Vertex) -> (&'static str, &'static str) {
    let shape = match vertex.body() {
        VertexBody::Empty => "circle",
        VertexBody::MolecularUnit { .. } => "ellipse",
        VertexBody::Template(_) => "box",
    };
    let color = if vertex.is_ring_closing() {
        "gray"
    } else {
        match vertex.bb_type() {
            BBType::Scaffold => "tomato",
            BBType::Fragment => "lightblue",
            BBType::Cap => "palegreen",
            BBType::None | BBType::Undefined => "white",
        }
    };
    (shape, color)
}

fn bond_width(bond: BondType) -> f64 {
    bond.order().map_or(1.0, |order| order as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttachmentPoint, BuildingBlockRef, ContractLevel, IdCounters};

    fn chain() -> DGraph {
        let mut g = DGraph::with_id(3);
        for (id, kind) in [(1, BBType::Scaffold), (2, BBType::Fragment), (3, BBType::Cap)] {
            let mut v = Vertex::molecular_unit(id, BuildingBlockRef::new(0, kind), "C");
            v.add_ap(AttachmentPoint::new(None)).unwrap();
            v.add_ap(AttachmentPoint::new(None)).unwrap();
            g.add_vertex(v).unwrap();
        }
        g.add_edge((1, 0).into(), (2, 0).into(), BondType::Double).unwrap();
        g.add_edge((2, 1).into(), (3, 0).into(), BondType::Single).unwrap();
        g
    }

    #[test]
    fn test_vertex_style() {
        let g = chain();
        assert_eq!(vertex_style(g.vertex(1).unwrap()), ("ellipse", "tomato"));
        assert_eq!(vertex_style(&Vertex::empty(9)), ("circle", "white"));
        assert_eq!(bond_width(BondType::Triple), 3.0);
        assert_eq!(bond_width(BondType::Undefined), 1.0);
    }

    #[test]
    fn test_dot_lists_vertices_and_edges() {
        let dot = chain().to_dot();
        assert!(dot.starts_with("digraph G3 {"));
        assert!(dot.contains("v1 [label="));
        assert!(dot.contains("v1 -> v2 [label=\"0:0\""));
        assert!(dot.contains("penwidth=2"));
        assert!(dot.contains("v2 -> v3"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_dot_nests_templates() {
        let ids = IdCounters::starting_at(100, 100);
        let mut outer = DGraph::with_id(1);
        let mut template = Vertex::new_template(7, BuildingBlockRef::none(), ContractLevel::Free);
        let mut inner = DGraph::new(&ids);
        inner.add_vertex(Vertex::empty(8)).unwrap();
        template.set_inner_graph(inner).unwrap();
        outer.add_vertex(template).unwrap();

        let dot = outer.to_dot();
        assert!(dot.contains("subgraph cluster_t7_"));
        assert!(dot.contains("t7_v8 [label="));
        assert!(dot.contains("shape=box"));
    }
}
