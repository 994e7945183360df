use aspects_core::{
    AspectNode, AspectPropertyNode, AspectPropertyTree, AspectTree, BaseType, EdgeId,
    PropertyCardinality, TraversalRecord, TreeBuildError, TreeBuilder,
};
use uuid::Uuid;

#[test]
fn single_aspect_without_properties_builds_a_leaf_tree() {
    let leaf = aspect("Leaf", &[], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(leaf.clone()).unwrap();

    let tree = builder.build_tree().unwrap();
    assert_eq!(tree.id, leaf.id);
    assert_eq!(tree.name, "Leaf");
    assert!(tree.properties.is_empty());
    assert_eq!(builder.built_count(), 1);
}

#[test]
fn build_tree_is_repeatable_on_a_finished_builder() {
    let leaf = aspect("Leaf", &[], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(leaf).unwrap();

    let first = builder.build_tree().unwrap();
    let second = builder.build_tree().unwrap();
    assert_eq!(first, second);
}

#[test]
fn nested_chain_resolves_bottom_up() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let charlie = aspect("Charlie", &[], &[f2]);
    let bravo = aspect("Bravo", &[e2], &[f1]);
    let alpha = aspect("Alpha", &[e1], &[]);
    let link_ab = property("width", &alpha, &bravo, e1, f1);
    let link_bc = property("depth", &bravo, &charlie, e2, f2);

    let mut builder = TreeBuilder::new();
    for record in [
        TraversalRecord::Aspect(alpha.clone()),
        TraversalRecord::Property(link_ab.clone()),
        TraversalRecord::Aspect(bravo.clone()),
        TraversalRecord::Property(link_bc.clone()),
        TraversalRecord::Aspect(charlie.clone()),
    ] {
        builder.append(record).unwrap();
    }

    let tree = builder.build_tree().unwrap();
    assert_eq!(tree.id, alpha.id);
    assert_eq!(tree.properties.len(), 1);
    assert_eq!(tree.properties[0].id, link_ab.id);
    let bravo_tree = &tree.properties[0].aspect;
    assert_eq!(bravo_tree.id, bravo.id);
    assert_eq!(bravo_tree.properties.len(), 1);
    assert_eq!(bravo_tree.properties[0].aspect.id, charlie.id);
    assert_eq!(builder.built_count(), 3);
}

#[test]
fn shared_target_is_materialized_once_and_deep_equal_everywhere() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let shared = aspect("Shared", &[], &[f1, f2]);
    let root = aspect("Root", &[e1, e2], &[]);
    let first_link = property("left", &root, &shared, e1, f1);
    let second_link = property("right", &root, &shared, e2, f2);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();
    builder.append_property(first_link).unwrap();
    builder.append_aspect(shared.clone()).unwrap();
    // Second reference resolves from cache; no aspect record follows.
    builder.append_property(second_link).unwrap();

    let tree = builder.build_tree().unwrap();
    assert_eq!(tree.properties.len(), 2);
    assert_eq!(tree.properties[0].aspect, tree.properties[1].aspect);
    assert_eq!(tree.properties[0].aspect.id, shared.id);
    assert_eq!(builder.built_count(), 2);
}

#[test]
fn redundant_revisit_record_after_cache_hit_is_tolerated() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let shared = aspect("Shared", &[], &[f1, f2]);
    let root = aspect("Root", &[e1, e2], &[]);
    let first_link = property("left", &root, &shared, e1, f1);
    let second_link = property("right", &root, &shared, e2, f2);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();
    builder.append_property(first_link).unwrap();
    builder.append_aspect(shared.clone()).unwrap();
    builder.append_property(second_link).unwrap();
    // Some producers re-emit the resolved child after a cached link.
    builder.append_aspect(shared.clone()).unwrap();

    let tree = builder.build_tree().unwrap();
    assert_eq!(tree.properties.len(), 2);
    assert_eq!(builder.built_count(), 2);
}

#[test]
fn unrelated_aspect_after_cache_hit_is_still_rejected() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let shared = aspect("Shared", &[], &[f1, f2]);
    let root = aspect("Root", &[e1, e2], &[]);
    let stray = aspect("Stray", &[], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();
    builder
        .append_property(property("left", &root, &shared, e1, f1))
        .unwrap();
    builder.append_aspect(shared.clone()).unwrap();
    builder
        .append_property(property("right", &root, &shared, e2, f2))
        .unwrap();

    let err = builder.append_aspect(stray.clone()).unwrap_err();
    assert!(matches!(err, TreeBuildError::TwoConsecutiveAspects(id) if id == stray.id));
}

#[test]
fn empty_stream_is_incomplete() {
    let builder = TreeBuilder::new();
    assert!(matches!(
        builder.build_tree(),
        Err(TreeBuildError::TreeIncomplete)
    ));
}

#[test]
fn stream_ending_on_an_unresolved_property_is_incomplete() {
    let (e1, f1) = edge_pair();
    let child = aspect("Child", &[], &[f1]);
    let root = aspect("Root", &[e1], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();
    builder
        .append_property(property("only", &root, &child, e1, f1))
        .unwrap();

    assert!(matches!(
        builder.build_tree(),
        Err(TreeBuildError::TreeIncomplete)
    ));
}

#[test]
fn stream_ending_before_all_properties_resolve_is_incomplete() {
    let (e1, _) = edge_pair();
    let (e2, _) = edge_pair();
    let root = aspect("Root", &[e1, e2], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root).unwrap();

    assert!(matches!(
        builder.build_tree(),
        Err(TreeBuildError::TreeIncomplete)
    ));
}

#[test]
fn two_consecutive_aspects_are_rejected() {
    let (e1, _) = edge_pair();
    let root = aspect("Root", &[e1], &[]);
    let intruder = aspect("Intruder", &[], &[]);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root).unwrap();

    let err = builder.append_aspect(intruder.clone()).unwrap_err();
    assert!(matches!(err, TreeBuildError::TwoConsecutiveAspects(id) if id == intruder.id));
}

#[test]
fn two_consecutive_properties_are_rejected() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let child = aspect("Child", &[], &[f1, f2]);
    let root = aspect("Root", &[e1, e2], &[]);
    let second = property("second", &root, &child, e2, f2);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();
    builder
        .append_property(property("first", &root, &child, e1, f1))
        .unwrap();

    let err = builder.append_property(second.clone()).unwrap_err();
    assert!(matches!(err, TreeBuildError::TwoConsecutiveProperties(id) if id == second.id));
}

#[test]
fn property_cannot_open_the_stream() {
    let (e1, f1) = edge_pair();
    let child = aspect("Child", &[], &[f1]);
    let owner = aspect("Owner", &[e1], &[]);
    let orphan = property("orphan", &owner, &child, e1, f1);

    let mut builder = TreeBuilder::new();
    let err = builder.append_property(orphan.clone()).unwrap_err();
    assert!(matches!(err, TreeBuildError::RootMustBeAspect(id) if id == orphan.id));
}

#[test]
fn property_with_foreign_incoming_edge_is_rejected() {
    let (e1, f1) = edge_pair();
    let child = aspect("Child", &[], &[f1]);
    let root = aspect("Root", &[e1], &[]);
    let mut foreign = property("foreign", &root, &child, e1, f1);
    foreign.in_edge = Uuid::new_v4();

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root.clone()).unwrap();

    let err = builder.append_property(foreign.clone()).unwrap_err();
    assert!(matches!(
        err,
        TreeBuildError::LinkageMismatch { property, aspect }
            if property == foreign.id && aspect == root.id
    ));
}

#[test]
fn aspect_not_linked_to_pending_property_is_rejected() {
    let (e1, f1) = edge_pair();
    let child = aspect("Child", &[], &[f1]);
    let root = aspect("Root", &[e1], &[]);
    let stranger = aspect("Stranger", &[], &[]);
    let link = property("link", &root, &child, e1, f1);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(root).unwrap();
    builder.append_property(link.clone()).unwrap();

    let err = builder.append_aspect(stranger.clone()).unwrap_err();
    assert!(matches!(
        err,
        TreeBuildError::LinkageMismatch { property, aspect }
            if property == link.id && aspect == stranger.id
    ));
}

#[test]
fn same_stream_rebuilds_deep_equal_trees() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let length = aspect("Length", &[], &[f1, f2]);
    let dims = aspect("Dimensions", &[e1, e2], &[]);
    let records = [
        TraversalRecord::Aspect(dims.clone()),
        TraversalRecord::Property(property("width", &dims, &length, e1, f1)),
        TraversalRecord::Aspect(length.clone()),
        TraversalRecord::Property(property("height", &dims, &length, e2, f2)),
    ];

    let mut first = TreeBuilder::new();
    let mut second = TreeBuilder::new();
    for record in &records {
        first.append(record.clone()).unwrap();
        second.append(record.clone()).unwrap();
    }

    assert_eq!(first.build_tree().unwrap(), second.build_tree().unwrap());
}

#[test]
fn dimensions_sharing_length_builds_it_exactly_once() {
    let (e1, f1) = edge_pair();
    let (e2, f2) = edge_pair();
    let length = aspect("Length", &[], &[f1, f2]);
    let dims = aspect("Dimensions", &[e1, e2], &[]);
    let width = property("width", &dims, &length, e1, f1);
    let height = property("height", &dims, &length, e2, f2);

    let mut builder = TreeBuilder::new();
    builder.append_aspect(dims.clone()).unwrap();
    builder.append_property(width.clone()).unwrap();
    builder.append_aspect(length.clone()).unwrap();
    builder.append_property(height.clone()).unwrap();
    builder.append_aspect(length.clone()).unwrap();

    let tree = builder.build_tree().unwrap();
    assert_eq!(tree.name, "Dimensions");
    assert_eq!(tree.properties.len(), 2);
    assert_eq!(tree.properties[0].id, width.id);
    assert_eq!(tree.properties[0].name.as_deref(), Some("width"));
    assert_eq!(tree.properties[1].id, height.id);
    assert_eq!(tree.properties[1].name.as_deref(), Some("height"));
    assert_eq!(tree.properties[0].aspect.name, "Length");
    assert!(tree.properties[0].aspect.properties.is_empty());
    assert_eq!(tree.properties[0].aspect, tree.properties[1].aspect);
    assert_eq!(builder.built_count(), 2);
}

#[test]
fn generated_trees_survive_flatten_and_rebuild() {
    for (depth, fan_out) in [(1, 0), (2, 1), (2, 4), (3, 2), (5, 2)] {
        let mut records = Vec::new();
        let mut label = 0;
        let expected = synthesize(Uuid::new_v4(), depth, fan_out, None, &mut label, &mut records);

        let mut builder = TreeBuilder::new();
        for record in records {
            builder.append(record).unwrap();
        }

        assert_eq!(builder.build_tree().unwrap(), expected);
        assert_eq!(builder.built_count(), label as usize);
    }
}

/// Emits one synthetic aspect with `fan_out` children per level into
/// `records` and returns the tree the builder is expected to produce.
fn synthesize(
    id: Uuid,
    depth: u32,
    fan_out: usize,
    parent_edge: Option<EdgeId>,
    label: &mut u32,
    records: &mut Vec<TraversalRecord>,
) -> AspectTree {
    let child_count = if depth <= 1 { 0 } else { fan_out };
    let links: Vec<(Uuid, EdgeId, EdgeId)> = (0..child_count)
        .map(|_| (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()))
        .collect();

    *label += 1;
    let mut node = aspect(&format!("Node{label}"), &[], &[]);
    node.id = id;
    node.out_edges = links.iter().map(|link| link.1).collect();
    node.in_edges = parent_edge.into_iter().collect();
    records.push(TraversalRecord::Aspect(node.clone()));

    let mut properties = Vec::new();
    for (index, (child_id, in_edge, out_edge)) in links.into_iter().enumerate() {
        let link = AspectPropertyNode {
            id: Uuid::new_v4(),
            name: Some(format!("p{index}")),
            aspect_id: id,
            target_id: child_id,
            cardinality: PropertyCardinality::One,
            version: 1,
            deleted: false,
            in_edge,
            out_edge,
        };
        records.push(TraversalRecord::Property(link.clone()));
        let child = synthesize(child_id, depth - 1, fan_out, Some(out_edge), label, records);
        properties.push(AspectPropertyTree {
            id: link.id,
            name: link.name,
            cardinality: link.cardinality,
            deleted: false,
            aspect: child,
        });
    }

    AspectTree {
        id: node.id,
        name: node.name,
        subject_id: node.subject_id,
        subject_name: node.subject_name,
        measure: node.measure,
        base_type: node.base_type,
        ref_book_id: node.ref_book_id,
        deleted: node.deleted,
        properties,
    }
}

fn edge_pair() -> (EdgeId, EdgeId) {
    (Uuid::new_v4(), Uuid::new_v4())
}

fn aspect(name: &str, out_edges: &[EdgeId], in_edges: &[EdgeId]) -> AspectNode {
    AspectNode {
        id: Uuid::new_v4(),
        name: name.to_string(),
        measure: None,
        base_type: Some(BaseType::Text),
        subject_id: None,
        subject_name: None,
        ref_book_id: None,
        description: None,
        version: 1,
        deleted: false,
        out_edges: out_edges.to_vec(),
        in_edges: in_edges.to_vec(),
    }
}

fn property(
    name: &str,
    owner: &AspectNode,
    target: &AspectNode,
    in_edge: EdgeId,
    out_edge: EdgeId,
) -> AspectPropertyNode {
    AspectPropertyNode {
        id: Uuid::new_v4(),
        name: Some(name.to_string()),
        aspect_id: owner.id,
        target_id: target.id,
        cardinality: PropertyCardinality::One,
        version: 1,
        deleted: false,
        in_edge,
        out_edge,
    }
}
