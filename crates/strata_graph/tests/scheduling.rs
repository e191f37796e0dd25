// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scheduling behavior on small graphs.

use std::cell::RefCell;
use std::rc::Rc;
use strata_graph::attribute::{BoolAttribute, FloatAttribute};
use strata_graph::data::Heightmap;
use strata_graph::nodes::{INPUT, OUTPUT};
use strata_graph::{
    create_terrain_registry, Graph, GraphConfig, GraphError, GraphEvent, Link, NodeId,
    NodeRegistry, NodeState,
};

struct Chain {
    graph: Graph,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    other: NodeId,
}

/// A (Constant) -> B (Inverse) -> C (Clamp), plus an unrelated Constant
fn chain(registry: &NodeRegistry) -> Chain {
    let mut graph = Graph::new("chain", GraphConfig::new([8, 8], [1, 1], 0.0));
    let a = graph.add_node_of_type(registry, "Constant").unwrap();
    let b = graph.add_node_of_type(registry, "Inverse").unwrap();
    let c = graph.add_node_of_type(registry, "Clamp").unwrap();
    let other = graph.add_node_of_type(registry, "Constant").unwrap();
    graph.connect(a.as_str(), OUTPUT, b.as_str(), INPUT).unwrap();
    graph.connect(b.as_str(), OUTPUT, c.as_str(), INPUT).unwrap();
    assert!(graph.update().is_success());
    Chain {
        graph,
        a,
        b,
        c,
        other,
    }
}

fn computed_order(graph: &mut Graph) -> Rc<RefCell<Vec<NodeId>>> {
    let order = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&order);
    graph.subscribe(move |event| {
        if let GraphEvent::ComputeFinished { node_id, success: true } = event {
            sink.borrow_mut().push(node_id.clone());
        }
    });
    order
}

#[test]
fn test_attribute_change_recomputes_downstream_in_order() {
    let registry = create_terrain_registry();
    let Chain {
        mut graph, a, b, c, other,
    } = chain(&registry);
    let order = computed_order(&mut graph);

    graph
        .set_attribute::<FloatAttribute>(a.as_str(), "value", 0.5)
        .unwrap();
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Dirty));
    assert_eq!(graph.node_state(other.as_str()), Some(NodeState::Clean));

    let report = graph.update();
    assert_eq!(report.computed, vec![a.clone(), b.clone(), c.clone()]);
    assert_eq!(*order.borrow(), vec![a, b, c]);
    assert!(graph.nodes().all(|n| n.state() == NodeState::Clean));
}

#[test]
fn test_producers_are_evaluated_before_consumers() {
    let registry = create_terrain_registry();
    let mut graph = Graph::new("diamond", GraphConfig::new([4, 4], [1, 1], 0.0));

    // Added in reverse dependency order on purpose
    let blend = graph.add_node_of_type(&registry, "Blend").unwrap();
    let right = graph.add_node_of_type(&registry, "Smooth").unwrap();
    let left = graph.add_node_of_type(&registry, "Gain").unwrap();
    let source = graph.add_node_of_type(&registry, "WhiteNoise").unwrap();
    graph.connect(source.as_str(), OUTPUT, left.as_str(), INPUT).unwrap();
    graph.connect(source.as_str(), OUTPUT, right.as_str(), INPUT).unwrap();
    graph.connect(left.as_str(), OUTPUT, blend.as_str(), "input 1").unwrap();
    graph.connect(right.as_str(), OUTPUT, blend.as_str(), "input 2").unwrap();

    let order = graph.update().computed;
    assert_eq!(order.len(), 4);
    let position = |id: &NodeId| order.iter().position(|n| n == id).unwrap();
    for link in graph.links() {
        assert!(position(&link.node_id_from) < position(&link.node_id_to), "{}", link);
    }
}

#[test]
fn test_manual_node_blocks_propagation() {
    let registry = create_terrain_registry();
    let Chain {
        mut graph, a, b, c, ..
    } = chain(&registry);
    graph
        .set_attribute::<BoolAttribute>(b.as_str(), "keep_range", false)
        .unwrap();
    graph.update();
    graph.set_auto_update(b.as_str(), false).unwrap();

    graph
        .set_attribute::<FloatAttribute>(a.as_str(), "value", 0.5)
        .unwrap();
    assert_eq!(graph.node_state(b.as_str()), Some(NodeState::Clean));
    assert!(graph.node(b.as_str()).unwrap().is_stale());
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Clean));

    let report = graph.update();
    assert_eq!(report.computed, vec![a.clone()]);
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Clean));

    let report = graph.update_node(b.as_str()).unwrap();
    assert_eq!(report.computed, vec![b.clone(), c.clone()]);
    assert!(!graph.node(b.as_str()).unwrap().is_stale());

    let seen = graph.get_value_ref::<Heightmap>(c.as_str(), INPUT).unwrap();
    assert!(seen.data.iter().all(|&v| v == -0.5));
}

#[test]
fn test_disconnect_leaves_consumer_dirty_until_updated() {
    let registry = create_terrain_registry();
    let Chain {
        mut graph, b, c, ..
    } = chain(&registry);

    let link = graph.disconnect(c.as_str(), INPUT).unwrap();
    assert_eq!(link, Link::new(b.clone(), OUTPUT, c.clone(), INPUT));
    assert!(graph.get_value_ref::<Heightmap>(c.as_str(), INPUT).is_none());
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Dirty));
    assert_eq!(graph.node_state(b.as_str()), Some(NodeState::Clean));

    let report = graph.update_node(c.as_str()).unwrap();
    assert_eq!(report.skipped, vec![c.clone()]);
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Clean));
    assert!(graph.get_value(c.as_str(), OUTPUT).is_none());
}

#[test]
fn test_rejected_connections_leave_state_unchanged() {
    let registry = create_terrain_registry();
    let Chain {
        mut graph, a, b, c, ..
    } = chain(&registry);
    let cloud = graph.add_node_of_type(&registry, "Cloud").unwrap();
    graph.update();
    let before = graph.links();
    let states: Vec<_> = graph.nodes().map(|n| n.state()).collect();

    assert!(matches!(
        graph.connect(cloud.as_str(), OUTPUT, b.as_str(), "mask"),
        Err(GraphError::TypeMismatch { .. })
    ));
    assert!(matches!(
        graph.connect(c.as_str(), OUTPUT, a.as_str(), INPUT),
        Err(GraphError::PortNotFound(_))
    ));
    assert!(matches!(
        graph.connect(c.as_str(), OUTPUT, b.as_str(), "mask"),
        Err(GraphError::CycleDetected)
    ));

    assert_eq!(graph.links(), before);
    assert_eq!(graph.nodes().map(|n| n.state()).collect::<Vec<_>>(), states);
    assert!(graph.get_value(b.as_str(), "mask").is_none());
}

#[test]
fn test_removing_a_node_dirties_consumers() {
    let registry = create_terrain_registry();
    let Chain {
        mut graph, b, c, ..
    } = chain(&registry);

    graph.remove_node(b.as_str()).unwrap();
    assert_eq!(graph.link_count(), 0);
    assert_eq!(graph.node_state(c.as_str()), Some(NodeState::Dirty));
    assert!(graph.topological_order().is_ok());
}
