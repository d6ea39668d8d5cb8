mod reduce;

pub use reduce::reduce;

use std::collections::BTreeMap;

use cranelift_entity::{entity_impl, PrimaryMap};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeHandle(u32);

entity_impl! { NodeHandle }

/// A labeled transition between two nodes, carrying its own property map.
#[derive(Clone, Debug)]
pub struct Edge<L, P> {
    pub label: L,
    pub to: NodeHandle,
    props: BTreeMap<String, P>,
}

impl<L, P> Edge<L, P> {
    pub fn props(&self) -> &BTreeMap<String, P> {
        &self.props
    }
}

#[derive(Clone, Debug)]
struct NodeData<L, P> {
    edges: Vec<Edge<L, P>>,
    props: BTreeMap<String, P>,
}

impl<L, P> NodeData<L, P> {
    fn empty() -> NodeData<L, P> {
        NodeData {
            edges: Vec::new(),
            props: BTreeMap::new(),
        }
    }
}

/// A directed graph with labeled edges, used to represent automaton state
/// machines. Nodes live in an arena and are referred to by handle.
///
/// Transitions are deterministic: a node may carry at most one edge per
/// label. Edge order is preserved from insertion, which matters to callers
/// that resolve overlapping labels by declaration order.
#[derive(Clone, Debug)]
pub struct Graph<L, P> {
    nodes: PrimaryMap<NodeHandle, NodeData<L, P>>,
    start: NodeHandle,
    ends: Vec<NodeHandle>,
}

impl<L: Clone + Eq, P> Graph<L, P> {
    /// Creates a graph with a fresh start node.
    pub fn new() -> Graph<L, P> {
        let mut nodes = PrimaryMap::new();
        let start = nodes.push(NodeData::empty());
        Graph {
            nodes,
            start,
            ends: Vec::new(),
        }
    }

    pub fn start(&self) -> NodeHandle {
        self.start
    }

    pub fn set_start(&mut self, node: NodeHandle) {
        debug_assert!(self.nodes.is_valid(node));
        self.start = node;
    }

    pub fn add_node(&mut self) -> NodeHandle {
        self.nodes.push(NodeData::empty())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> cranelift_entity::Keys<NodeHandle> {
        self.nodes.keys()
    }

    /// Adds an edge. A second edge with an already present label would make
    /// the transition nondeterministic, which is a caller bug.
    pub fn add_edge(&mut self, from: NodeHandle, label: L, to: NodeHandle) {
        assert!(
            self.edge_target(from, &label).is_none(),
            "duplicate edge label on node {from:?}"
        );
        debug_assert!(self.nodes.is_valid(to));
        self.nodes[from].edges.push(Edge {
            label,
            to,
            props: BTreeMap::new(),
        });
    }

    /// Follows the edge with this label if it exists, otherwise inserts one.
    /// The inserted edge goes to `to`, or to a fresh node when `to` is None.
    pub fn ensure_edge(&mut self, from: NodeHandle, label: L, to: Option<NodeHandle>) -> NodeHandle {
        if let Some(existing) = self.edge_target(from, &label) {
            return existing;
        }
        let target = to.unwrap_or_else(|| self.add_node());
        self.add_edge(from, label, target);
        target
    }

    pub fn edge_target(&self, node: NodeHandle, label: &L) -> Option<NodeHandle> {
        self.nodes[node]
            .edges
            .iter()
            .find(|e| e.label == *label)
            .map(|e| e.to)
    }

    pub fn edges(&self, node: NodeHandle) -> &[Edge<L, P>] {
        &self.nodes[node].edges
    }

    pub fn set_end(&mut self, node: NodeHandle) {
        if !self.ends.contains(&node) {
            self.ends.push(node);
        }
    }

    pub fn is_end(&self, node: NodeHandle) -> bool {
        self.ends.contains(&node)
    }

    pub fn ends(&self) -> &[NodeHandle] {
        &self.ends
    }

    pub fn set_prop(&mut self, node: NodeHandle, key: &str, value: P) {
        self.nodes[node].props.insert(key.to_owned(), value);
    }

    pub fn prop(&self, node: NodeHandle, key: &str) -> Option<&P> {
        self.nodes[node].props.get(key)
    }

    pub fn props(&self, node: NodeHandle) -> &BTreeMap<String, P> {
        &self.nodes[node].props
    }

    pub fn set_edge_prop(&mut self, node: NodeHandle, label: &L, key: &str, value: P) {
        let edge = self.nodes[node]
            .edges
            .iter_mut()
            .find(|e| e.label == *label)
            .expect("no edge with this label");
        edge.props.insert(key.to_owned(), value);
    }

    pub fn edge_prop(&self, node: NodeHandle, label: &L, key: &str) -> Option<&P> {
        self.nodes[node]
            .edges
            .iter()
            .find(|e| e.label == *label)
            .and_then(|e| e.props.get(key))
    }
}

impl<L: Clone + Eq, P> Default for Graph<L, P> {
    fn default() -> Graph<L, P> {
        Graph::new()
    }
}

#[test]
fn test_edges() {
    let mut g: Graph<char, u32> = Graph::new();
    let a = g.start();
    let b = g.add_node();
    let c = g.add_node();
    g.add_edge(a, 'x', b);
    g.add_edge(a, 'y', c);
    g.add_edge(b, 'x', a);

    assert_eq!(g.edge_target(a, &'x'), Some(b));
    assert_eq!(g.edge_target(a, &'y'), Some(c));
    assert_eq!(g.edge_target(a, &'z'), None);
    assert_eq!(g.edge_target(b, &'x'), Some(a));
    assert_eq!(g.node_count(), 3);

    // edge order is insertion order
    let labels: Vec<char> = g.edges(a).iter().map(|e| e.label).collect();
    assert_eq!(labels, vec!['x', 'y']);
}

#[test]
#[should_panic]
fn test_duplicate_label_panics() {
    let mut g: Graph<char, u32> = Graph::new();
    let a = g.start();
    let b = g.add_node();
    g.add_edge(a, 'x', b);
    g.add_edge(a, 'x', a);
}

#[test]
fn test_ensure_edge_reuses() {
    let mut g: Graph<char, ()> = Graph::new();
    let a = g.start();
    let b = g.ensure_edge(a, 'x', None);
    assert_eq!(g.ensure_edge(a, 'x', None), b);
    let c = g.add_node();
    // existing edge wins over the requested target
    assert_eq!(g.ensure_edge(a, 'x', Some(c)), b);
    assert_eq!(g.ensure_edge(a, 'y', Some(c)), c);
}

#[test]
fn test_props() {
    let mut g: Graph<char, u32> = Graph::new();
    let a = g.start();
    let b = g.add_node();
    g.add_edge(a, 'x', b);
    g.set_prop(a, "depth", 0);
    g.set_prop(b, "depth", 1);
    g.set_edge_prop(a, &'x', "weight", 7);

    assert_eq!(g.prop(a, "depth"), Some(&0));
    assert_eq!(g.prop(b, "depth"), Some(&1));
    assert_eq!(g.prop(b, "missing"), None);
    assert_eq!(g.edge_prop(a, &'x', "weight"), Some(&7));
    assert_eq!(g.edge_prop(a, &'x', "missing"), None);
}
