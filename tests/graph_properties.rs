use std::collections::BTreeMap;

use bbgraph::library::{AnyCompatibility, BuildingBlockLibrary, InMemoryLibrary};
use bbgraph::*;

fn unit(content: &str, classes: &[&str]) -> Vertex {
    let mut v = Vertex::molecular_unit(0, BuildingBlockRef::none(), content);
    for class in classes {
        v.add_ap(AttachmentPoint::new(Some(class.parse().unwrap())))
            .unwrap();
    }
    v
}

/// Scaffold 0 with four APs, two kinds of linkers, a cap and a ring-closing unit.
struct Blocks {
    library: InMemoryLibrary,
    scaffold: BuildingBlockRef,
    linker: BuildingBlockRef,
    other_linker: BuildingBlockRef,
    rcv: BuildingBlockRef,
}

fn blocks() -> Blocks {
    let mut library = InMemoryLibrary::permissive();
    let scaffold = library.add_building_block(BBType::Scaffold, unit("C1CCCC1", &["s:0"; 4]));
    let linker = library.add_building_block(BBType::Fragment, unit("CC", &["f:0", "f:1"]));
    let other_linker = library.add_building_block(BBType::Fragment, unit("CN", &["f:0", "f:1"]));
    let rcv = library.add_building_block(BBType::Fragment, unit("", &["ATplus:0"]));
    Blocks {
        library,
        scaffold,
        linker,
        other_linker,
        rcv,
    }
}

/// Scaffold 1 carrying four branches `10+k -> 20+k`, where `20+k` is a
/// ring-closing vertex. The first `rings` pairs of branches are closed into
/// rings and the first `sets` pairs of linkers are symmetric.
fn decorated(b: &Blocks, first_linker: BuildingBlockRef, rings: usize, sets: usize) -> DGraph {
    let lib = &b.library;
    let ids = IdCounters::new();
    let mut g = DGraph::with_id(1);
    g.add_vertex(lib.make_vertex(b.scaffold, 1, &ids).unwrap()).unwrap();
    for k in 0..4u64 {
        let bb = if k == 0 { first_linker } else { b.linker };
        g.add_vertex(lib.make_vertex(bb, 10 + k, &ids).unwrap()).unwrap();
        g.add_vertex(lib.make_vertex(b.rcv, 20 + k, &ids).unwrap()).unwrap();
        g.add_edge((1, k as usize).into(), (10 + k, 0).into(), BondType::Single)
            .unwrap();
        g.add_edge((10 + k, 1).into(), (20 + k, 0).into(), BondType::Single)
            .unwrap();
    }
    for r in 0..rings as u64 {
        g.add_ring(20 + 2 * r, 21 + 2 * r).unwrap();
    }
    for s in 0..sets as u64 {
        g.add_symmetric_set([10 + 2 * s, 11 + 2 * s]).unwrap();
    }
    g
}

fn assert_every_ap_is_free_or_bound_once(g: &DGraph) {
    g.check_consistency().unwrap();
    for vertex in g.vertices() {
        for index in 0..vertex.ap_count() {
            let ap = ApRef::new(vertex.id(), index);
            let users = g.edges().iter().filter(|e| e.uses(ap)).count();
            let available = g.ap(ap).unwrap().is_available();
            assert!(
                (available && users == 0) || (!available && users == 1),
                "{ap} is available={available} with {users} users"
            );
        }
    }
}

#[test]
fn test_ap_invariant_holds_after_edits() {
    let b = blocks();
    let ids = IdCounters::starting_at(100, 100);
    let mut g = decorated(&b, b.linker, 2, 2);
    assert_every_ap_is_free_or_bound_once(&g);

    let map = BTreeMap::from([(0, 0), (1, 1)]);
    g.replace_vertex(12, b.other_linker, &map, &b.library, &ids, true)
        .unwrap();
    assert_every_ap_is_free_or_bound_once(&g);

    g.remove_branch(11).unwrap();
    assert_every_ap_is_free_or_bound_once(&g);
}

#[test]
fn test_json_round_trip() {
    let b = blocks();
    for (rings, sets) in [(0, 0), (1, 1), (2, 2)] {
        let g = decorated(&b, b.linker, rings, sets);
        let ids = IdCounters::new();
        let back = parse_json(&g.to_json().unwrap(), &ids).unwrap();
        assert_eq!(back.ring_count(), rings);
        assert_eq!(back.symmetric_set_count(), sets);
        assert!(back.is_isomorphic_to(&g), "{rings} rings, {sets} sets");
        assert!(ids.current_vertex_index() > 23);
    }
}

#[test]
fn test_json_round_trip_with_template() {
    let b = blocks();
    let ids = IdCounters::starting_at(500, 500);
    let mut inner = decorated(&b, b.linker, 1, 0);
    // frees AP 1 of linkers 12 and 13
    inner.remove_vertex(22).unwrap();
    inner.remove_vertex(23).unwrap();
    let mut template = Vertex::new_template(
        2,
        BuildingBlockRef::new(0, BBType::Scaffold),
        ContractLevel::FixedStructure,
    );
    template.set_inner_graph(inner).unwrap();
    let outer_aps = template.ap_count();
    assert_eq!(outer_aps, 2);

    let mut g = DGraph::with_id(7);
    g.add_vertex(template).unwrap();
    g.add_vertex(b.library.make_vertex(b.linker, 3, &ids).unwrap()).unwrap();
    g.add_edge((2, 0).into(), (3, 0).into(), BondType::Single).unwrap();

    let back = parse_json(&g.to_json().unwrap(), &ids).unwrap();
    assert_every_ap_is_free_or_bound_once(&back);
    assert!(back.is_isomorphic_to(&g));
    let restored = back.vertex(2).unwrap();
    assert_eq!(restored.ap_count(), outer_aps);
    assert_eq!(restored.inner_graph().unwrap().jacket(), Some(2));
    assert_eq!(back.embedding_path(1), Some(vec![2]));
}

#[test]
fn test_legacy_round_trip() {
    let b = blocks();
    for (rings, sets) in [(0, 0), (1, 1), (2, 2)] {
        let g = decorated(&b, b.linker, rings, sets);
        let text = g.to_legacy_string();
        let ids = IdCounters::new();
        let back = parse_legacy(&text, Some(&b.library), &ids).unwrap();
        assert_eq!(back.ring_count(), rings);
        assert_eq!(back.symmetric_set_count(), sets);
        assert!(back.is_isomorphic_to(&g), "{text}");
        assert_eq!(back.to_legacy_string(), text);
    }
}

#[test]
fn test_extract_and_replace_back() {
    let b = blocks();
    let ids = IdCounters::starting_at(100, 100);
    let original = decorated(&b, b.linker, 1, 1);
    let mut g = original.clone();

    let mut branch = g.extract_subgraph(10, &ids).unwrap();
    assert_eq!(branch.vertex_ids(), vec![10, 20]);
    assert_eq!(branch.ring_count(), 0);

    // the branch comes back under new ids
    let renamed = branch.renumber_vertices(&ids);
    let (linker, rcv) = (renamed[&10], renamed[&20]);
    assert!(linker >= 100 && rcv >= 100 && linker != rcv);
    let mut map = BTreeMap::new();
    for (old, new) in &renamed {
        for index in 0..branch.vertex(*new).unwrap().ap_count() {
            map.insert(ApRef::new(*old, index), ApRef::new(*new, index));
        }
    }
    let report = g
        .replace_single_subgraph(&[10, 20], branch, &map, &AnyCompatibility)
        .unwrap();

    g.check_consistency().unwrap();
    assert_eq!(report.added, vec![linker, rcv]);
    assert!(!g.contains_vertex(10) && !g.contains_vertex(20));
    assert_eq!(g.vertex_count(), original.vertex_count());
    assert_eq!(g.parent_of(linker), Some(1));
    assert_eq!(g.parent_of(rcv), Some(linker));
    assert_eq!(g.edge_to_parent(linker).unwrap().src(), ApRef::new(1, 0));
    assert_eq!(g.ring_count(), 1);
    assert_eq!(g.rings()[0].vertices(), &[rcv, linker, 1, 11, 21]);
    assert!(g.is_isostructural_to(&original));
}

#[test]
fn test_remove_vertex_updates_rings_and_sets() {
    let b = blocks();
    let mut g = decorated(&b, b.linker, 2, 2);
    g.remove_vertex(10).unwrap();
    assert_eq!(g.ring_count(), 1);
    assert_eq!(g.symmetric_set_count(), 1);
    assert!(g.symmetric_set_of(11).is_none());
    g.check_consistency().unwrap();
}

#[test]
fn test_isomorphism_is_reflexive_and_symmetric() {
    let b = blocks();
    let empty_a = DGraph::with_id(1);
    let empty_b = DGraph::with_id(2);
    assert!(empty_a.is_isomorphic_to(&empty_a));
    assert!(empty_a.is_isomorphic_to(&empty_b));
    assert!(empty_b.is_isomorphic_to(&empty_a));

    let graphs = [
        decorated(&b, b.linker, 0, 0),
        decorated(&b, b.linker, 1, 1),
        decorated(&b, b.linker, 2, 2),
    ];
    for (i, a) in graphs.iter().enumerate() {
        assert!(a.is_isomorphic_to(a));
        assert!(a.is_isostructural_to(a));
        for (j, other) in graphs.iter().enumerate() {
            assert_eq!(a.is_isomorphic_to(other), other.is_isomorphic_to(a));
            assert_eq!(a.is_isomorphic_to(other), i == j);
        }
        assert!(!a.is_isomorphic_to(&empty_a));
    }
}

#[test]
fn test_isostructural_but_not_isomorphic() {
    let b = blocks();
    let plain = decorated(&b, b.linker, 1, 0);
    let swapped = decorated(&b, b.other_linker, 1, 0);
    assert!(plain.is_isostructural_to(&swapped));
    assert!(!plain.is_isomorphic_to(&swapped));

    let config = IsomorphismConfig::default();
    assert_eq!(isomorphism(&plain, &swapped, &config), IsomorphismOutcome::NoMatch);
    assert_eq!(isostructural(&plain, &swapped, &config), IsomorphismOutcome::Match);
}

#[test]
fn test_ring_of_ten_distances() {
    let ring = Ring::new((0..10).collect(), BondType::Single);
    assert_eq!(ring.distance(0, 3), Some(3));
    assert_eq!(ring.distance(3, 0), Some(3));
    assert_eq!(ring.closer_to(4, 8, 5), Some(4));
    assert_eq!(ring.closer_to(4, 8, 7), Some(8));
}

#[test]
fn test_vertex_counter_reset() {
    let ids = IdCounters::new();
    ids.unique_vertex_index();
    ids.unique_vertex_index();
    let current = ids.current_vertex_index();

    assert!(matches!(
        ids.reset_vertex_counter(current),
        Err(GraphError::CounterRegression { .. })
    ));
    assert!(ids.reset_vertex_counter(current - 1).is_err());

    ids.reset_vertex_counter(current + 5).unwrap();
    assert_eq!(ids.unique_vertex_index(), current + 5);
    assert_eq!(ids.unique_vertex_index(), current + 6);
    assert_eq!(ids.unique_vertex_index(), current + 7);
}

#[test]
fn test_fixed_template_is_immutable() {
    let b = blocks();
    let mut template = Vertex::new_template(2, BuildingBlockRef::none(), ContractLevel::Fixed);
    template
        .set_inner_graph(decorated(&b, b.linker, 0, 0))
        .unwrap();

    assert!(matches!(
        template.set_inner_graph(decorated(&b, b.linker, 1, 0)),
        Err(GraphError::ImmutableTemplate(_))
    ));
    assert!(matches!(
        template.edit_inner_graph(|inner| {
            inner.remove_vertex(23)?;
            Ok(Vec::new())
        }),
        Err(GraphError::ImmutableTemplate(_))
    ));
    assert!(matches!(
        template.set_contract_level(ContractLevel::Free),
        Err(GraphError::ImmutableTemplate(_))
    ));
    assert_eq!(template.inner_graph().unwrap().vertex_count(), 9);
}
