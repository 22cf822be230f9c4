use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use petgraph::algo::is_isomorphic_matching;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::IntoNodeReferences;
use tracing::*;

use crate::graph::{BondType, DGraph, EdgeEnd, UndirectedEdge, Vertex};
use crate::VertexId;

/// Limits for graph comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsomorphismConfig {
    /// Wall-clock budget for one comparison. When it runs out the graphs are
    /// reported as different.
    pub timeout: Duration,
}

impl Default for IsomorphismConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsomorphismOutcome {
    Match,
    NoMatch,
    TimedOut,
}

impl IsomorphismOutcome {
    /// Only a completed search that found a mapping counts as a match.
    pub fn is_match(&self) -> bool {
        *self == IsomorphismOutcome::Match
    }
}

/// A node of the labelled graph handed to the matcher.
#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Unit(&'a Vertex),
    /// Topology only: a vertex whose identity does not matter.
    Block,
    Ring { size: usize, bond: BondType },
    SymmetricSet(usize),
    FreeAp,
    /// Ring chord between the vertices holding its ring-closing vertices.
    Chord { self_loop: bool, bond: BondType },
}

/// An edge of the labelled graph.
#[derive(Debug, Clone, PartialEq)]
enum Link {
    /// Ties a marker or a free AP to what it belongs to.
    Tie,
    Bond(BondType),
    Edge(UndirectedEdge),
}

impl Node<'_> {
    fn same_as(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Unit(a), Node::Unit(b)) => a.same_as_outside(b),
            (Node::Block, Node::Block) | (Node::FreeAp, Node::FreeAp) => true,
            (Node::Ring { size: s1, bond: b1 }, Node::Ring { size: s2, bond: b2 }) => s1 == s2 && b1 == b2,
            (Node::SymmetricSet(a), Node::SymmetricSet(b)) => a == b,
            (
                Node::Chord { self_loop: l1, bond: b1 },
                Node::Chord { self_loop: l2, bond: b2 },
            ) => l1 == l2 && b1 == b2,
            _ => false,
        }
    }

    /// Starting label of the invariant refinement. Nodes that match have equal
    /// keys.
    fn invariant_key(&self) -> u64 {
        match self {
            Node::Unit(v) => compute_hash(&(
                0u8,
                v.kind(),
                v.building_block(),
                v.ap_count(),
                v.free_ap_count(),
                v.is_ring_closing(),
            )),
            Node::Block => compute_hash(&1u8),
            Node::Ring { size, bond } => compute_hash(&(2u8, size, bond)),
            Node::SymmetricSet(size) => compute_hash(&(3u8, size)),
            Node::FreeAp => compute_hash(&4u8),
            Node::Chord { self_loop, bond } => compute_hash(&(5u8, self_loop, bond)),
        }
    }
}

type Labelled<'a> = UnGraph<Node<'a>, Link>;

fn compute_hash<T: Hash>(t: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    t.hash(&mut hasher);
    hasher.finish()
}

fn edge_end(graph: &DGraph, vertex: VertexId, ap_index: usize) -> EdgeEnd {
    let owner = graph.vertex(vertex);
    let ap = owner.and_then(|v| v.ap(ap_index));
    EdgeEnd {
        bb_precedence: owner.map(|v| v.bb_type().precedence()).unwrap_or_default(),
        bb_id: owner.map(|v| v.building_block().id).unwrap_or_default(),
        atom_position: ap.and_then(|ap| ap.atom_position()),
        class: ap.and_then(|ap| ap.class().cloned()),
        ap_index,
    }
}

/// Everything that tells two graphs apart: vertices, edges compared as
/// undirected relations, rings as marker nodes tied to their ends and
/// symmetric sets as marker nodes tied to their members.
fn full_view(graph: &DGraph) -> Labelled<'_> {
    let mut view = Labelled::default();
    let mut index: HashMap<VertexId, NodeIndex> = HashMap::new();
    for vertex in graph.vertices() {
        index.insert(vertex.id(), view.add_node(Node::Unit(vertex)));
    }
    for edge in graph.edges() {
        let (Some(a), Some(b)) = (index.get(&edge.src_vertex()), index.get(&edge.trg_vertex())) else {
            continue;
        };
        let label = UndirectedEdge::new(
            edge_end(graph, edge.src().vertex, edge.src().index),
            edge_end(graph, edge.trg().vertex, edge.trg().index),
            edge.bond(),
        );
        view.add_edge(*a, *b, Link::Edge(label));
    }
    for ring in graph.rings() {
        let marker = view.add_node(Node::Ring {
            size: ring.size(),
            bond: ring.bond(),
        });
        for end in [ring.head(), ring.tail()].into_iter().flatten() {
            if let Some(node) = index.get(&end) {
                view.add_edge(marker, *node, Link::Tie);
            }
        }
    }
    for set in graph.symmetric_sets() {
        let marker = view.add_node(Node::SymmetricSet(set.len()));
        for member in set.ids() {
            if let Some(node) = index.get(member) {
                view.add_edge(marker, *node, Link::Tie);
            }
        }
    }
    view
}

/// The shape of a graph with building-block identity left out.
///
/// Ring-closing vertices that close a ring are dropped and the ring becomes
/// a chord between the vertices they hang from. Free APs are kept as leaves
/// so that blocks of different valence are told apart. Bond types stay on
/// tree edges and chords.
fn kernel_view(graph: &DGraph) -> Labelled<'static> {
    let closing: Vec<VertexId> = graph
        .rings()
        .iter()
        .flat_map(|r| [r.head(), r.tail()])
        .flatten()
        .collect();

    let mut view = Labelled::default();
    let mut index: HashMap<VertexId, NodeIndex> = HashMap::new();
    for vertex in graph.vertices().iter().filter(|v| !closing.contains(&v.id())) {
        let node = view.add_node(Node::Block);
        index.insert(vertex.id(), node);
        for _ in 0..vertex.free_ap_count() {
            let ap = view.add_node(Node::FreeAp);
            view.add_edge(node, ap, Link::Tie);
        }
    }
    for edge in graph.edges() {
        if let (Some(a), Some(b)) = (index.get(&edge.src_vertex()), index.get(&edge.trg_vertex())) {
            view.add_edge(*a, *b, Link::Bond(edge.bond()));
        }
    }
    for ring in graph.rings() {
        let anchors: Vec<NodeIndex> = [ring.head(), ring.tail()]
            .into_iter()
            .flatten()
            .filter_map(|end| graph.parent_of(end))
            .filter_map(|parent| index.get(&parent).copied())
            .collect();
        if let [a, b] = anchors[..] {
            let chord = view.add_node(Node::Chord {
                self_loop: a == b,
                bond: ring.bond(),
            });
            view.add_edge(chord, a, Link::Bond(ring.bond()));
            if a != b {
                view.add_edge(chord, b, Link::Bond(ring.bond()));
            }
        } else {
            debug!(
                "Ring {:?} has an end without parent, left out of the kernel",
                ring.vertices()
            );
        }
    }
    view
}

/// Morgan-style refinement of node labels by their neighbourhoods, returned
/// as a sorted multiset. Different multisets mean the graphs cannot match.
fn invariant_profile(view: &Labelled) -> Vec<u64> {
    let mut labels: Vec<u64> = view.node_references().map(|(_, n)| n.invariant_key()).collect();
    let mut classes = count_distinct(&labels);
    for _ in 0..view.node_count() {
        let next: Vec<u64> = view
            .node_indices()
            .map(|node| {
                let mut neighbor_labels: Vec<u64> =
                    view.neighbors(node).map(|nbr| labels[nbr.index()]).collect();
                neighbor_labels.sort_unstable();
                compute_hash(&(labels[node.index()], neighbor_labels))
            })
            .collect();
        let next_classes = count_distinct(&next);
        labels = next;
        if next_classes == classes {
            break;
        }
        classes = next_classes;
    }
    labels.sort_unstable();
    labels
}

fn count_distinct(labels: &[u64]) -> usize {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_insert(0usize) += 1;
    }
    counts.len()
}

fn matching(a: &Labelled, b: &Labelled, deadline: Instant) -> IsomorphismOutcome {
    if a.node_count() != b.node_count() || a.edge_count() != b.edge_count() {
        return IsomorphismOutcome::NoMatch;
    }
    if a.node_count() == 0 {
        return IsomorphismOutcome::Match;
    }
    if invariant_profile(a) != invariant_profile(b) {
        trace!("Invariant profiles differ");
        return IsomorphismOutcome::NoMatch;
    }

    let timed_out = Cell::new(false);
    let found = is_isomorphic_matching(
        a,
        b,
        |x, y| {
            if timed_out.get() || Instant::now() >= deadline {
                timed_out.set(true);
                return false;
            }
            if !x.same_as(y) {
                return false;
            }
            let (Node::Unit(u), Node::Unit(v)) = (x, y) else {
                return true;
            };
            match nested_match(u, v, deadline) {
                IsomorphismOutcome::Match => true,
                IsomorphismOutcome::NoMatch => false,
                IsomorphismOutcome::TimedOut => {
                    timed_out.set(true);
                    false
                }
            }
        },
        |x, y| x == y,
    );
    if found {
        IsomorphismOutcome::Match
    } else if timed_out.get() {
        IsomorphismOutcome::TimedOut
    } else {
        IsomorphismOutcome::NoMatch
    }
}

/// Compares the graphs nested in two vertices that already match from the
/// outside, against the deadline of the enclosing comparison.
fn nested_match(a: &Vertex, b: &Vertex, deadline: Instant) -> IsomorphismOutcome {
    match (a.inner_graph(), b.inner_graph()) {
        (Some(x), Some(y)) => compare_full(x, y, deadline),
        _ => IsomorphismOutcome::Match,
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + Duration::from_secs(u32::MAX as u64))
}

fn compare_full(a: &DGraph, b: &DGraph, deadline: Instant) -> IsomorphismOutcome {
    if a.vertex_count() != b.vertex_count()
        || a.edge_count() != b.edge_count()
        || a.ring_count() != b.ring_count()
        || a.symmetric_set_count() != b.symmetric_set_count()
    {
        return IsomorphismOutcome::NoMatch;
    }
    matching(&full_view(a), &full_view(b), deadline)
}

/// Compare two graphs vertex for vertex, edge for edge, ring for ring and
/// symmetric set for symmetric set. Graphs nested in templates share the
/// time budget of the outer comparison.
pub fn isomorphism(a: &DGraph, b: &DGraph, config: &IsomorphismConfig) -> IsomorphismOutcome {
    let outcome = compare_full(a, b, deadline_after(config.timeout));
    if outcome == IsomorphismOutcome::TimedOut {
        warn!(
            "Isomorphism check between graphs {} and {} timed out after {:?}",
            a.id(),
            b.id(),
            config.timeout
        );
    }
    outcome
}

/// Compare the shapes of two graphs, ring chords and bond types included,
/// ignoring which building blocks fill them.
pub fn isostructural(a: &DGraph, b: &DGraph, config: &IsomorphismConfig) -> IsomorphismOutcome {
    if a.ring_count() != b.ring_count() {
        return IsomorphismOutcome::NoMatch;
    }
    let outcome = matching(&kernel_view(a), &kernel_view(b), deadline_after(config.timeout));
    if outcome == IsomorphismOutcome::TimedOut {
        warn!(
            "Isostructural check between graphs {} and {} timed out after {:?}",
            a.id(),
            b.id(),
            config.timeout
        );
    }
    outcome
}

impl DGraph {
    pub fn is_isomorphic_to(&self, other: &DGraph) -> bool {
        self.is_isomorphic_to_within(other, &IsomorphismConfig::default())
    }

    /// A timeout counts as "not isomorphic".
    pub fn is_isomorphic_to_within(&self, other: &DGraph, config: &IsomorphismConfig) -> bool {
        isomorphism(self, other, config).is_match()
    }

    pub fn is_isostructural_to(&self, other: &DGraph) -> bool {
        self.is_isostructural_to_within(other, &IsomorphismConfig::default())
    }

    pub fn is_isostructural_to_within(&self, other: &DGraph, config: &IsomorphismConfig) -> bool {
        isostructural(self, other, config).is_match()
    }
}
