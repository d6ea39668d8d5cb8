use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use cranelift_entity::SecondaryMap;

use crate::{Graph, NodeHandle};

/// What a node looks like from the outside during one refinement round:
/// acceptance, own properties, and the (label, target class, edge props)
/// triples of its outgoing edges, sorted by label.
#[derive(PartialEq, Eq, Hash)]
struct Signature<'a, L, P> {
    is_end: bool,
    props: Vec<(&'a str, &'a P)>,
    edges: Vec<(&'a L, u32, Vec<(&'a str, &'a P)>)>,
}

fn signature<'a, L, P>(
    graph: &'a Graph<L, P>,
    node: NodeHandle,
    class: &SecondaryMap<NodeHandle, u32>,
) -> Signature<'a, L, P>
where
    L: Clone + Eq + Ord,
{
    let mut edges: Vec<(&L, u32, Vec<(&str, &P)>)> = graph
        .edges(node)
        .iter()
        .map(|e| {
            let props = e.props().iter().map(|(k, v)| (k.as_str(), v)).collect();
            (&e.label, class[e.to], props)
        })
        .collect();
    edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    Signature {
        is_end: graph.is_end(node),
        props: graph.props(node).iter().map(|(k, v)| (k.as_str(), v)).collect(),
        edges,
    }
}

/// Minimizes a graph by iterative partition refinement.
///
/// Nodes start out partitioned by acceptance and own properties, then
/// classes split whenever two members disagree on where their equally
/// labeled edges lead. At the fixed point every class becomes one node of
/// the output graph, which accepts exactly the label strings the input
/// accepted. Edge order within a class follows its lowest-numbered member,
/// so first-applicable-edge matching keeps behaving the same.
///
/// Properties of merged nodes and edges are unioned; when two members
/// disagree on the value of the same key the first writer (lowest node
/// handle) wins, see DESIGN.md.
pub fn reduce<L, P>(graph: &Graph<L, P>) -> Graph<L, P>
where
    L: Clone + Eq + Ord + Hash,
    P: Clone + Eq + Hash,
{
    let mut class: SecondaryMap<NodeHandle, u32> = SecondaryMap::new();
    let mut class_count: u32;

    // initial partition: nodes indistinguishable without looking at edges
    {
        let no_edges: SecondaryMap<NodeHandle, u32> = SecondaryMap::new();
        let mut seen: HashMap<Signature<L, P>, u32> = HashMap::new();
        for node in graph.nodes() {
            let mut sig = signature(graph, node, &no_edges);
            sig.edges.clear();
            let next = seen.len() as u32;
            class[node] = *seen.entry(sig).or_insert(next);
        }
        class_count = seen.len() as u32;
    }

    loop {
        let mut seen: HashMap<(u32, Signature<L, P>), u32> = HashMap::new();
        let mut next_class: SecondaryMap<NodeHandle, u32> = SecondaryMap::new();
        for node in graph.nodes() {
            let sig = signature(graph, node, &class);
            let next = seen.len() as u32;
            next_class[node] = *seen.entry((class[node], sig)).or_insert(next);
        }

        let count = seen.len() as u32;
        class = next_class;
        if count == class_count {
            break;
        }
        class_count = count;
    }

    build(graph, &class, class_count)
}

fn build<L, P>(
    graph: &Graph<L, P>,
    class: &SecondaryMap<NodeHandle, u32>,
    class_count: u32,
) -> Graph<L, P>
where
    L: Clone + Eq,
    P: Clone + Eq,
{
    let mut out: Graph<L, P> = Graph::new();

    // the start node's class maps onto the fresh graph's start node
    let mut node_of: Vec<Option<NodeHandle>> = vec![None; class_count as usize];
    node_of[class[graph.start()] as usize] = Some(out.start());
    for id in 0..class_count as usize {
        if node_of[id].is_none() {
            node_of[id] = Some(out.add_node());
        }
    }
    let node_of = |id: u32| node_of[id as usize].unwrap();

    // edges come from the lowest-numbered member of each class so their
    // order survives; properties are unioned across all members
    let mut done: Vec<bool> = vec![false; class_count as usize];
    for node in graph.nodes() {
        let id = class[node];
        let from = node_of(id);

        if !std::mem::replace(&mut done[id as usize], true) {
            for edge in graph.edges(node) {
                out.add_edge(from, edge.label.clone(), node_of(class[edge.to]));
            }
            if graph.is_end(node) {
                out.set_end(from);
            }
        } else if graph.is_end(node) {
            out.set_end(from);
        }

        merge_props(graph.props(node), |key, value| {
            match out.prop(from, key) {
                Some(old) => debug_assert!(old == value, "conflicting node property {key:?}"),
                None => out.set_prop(from, key, value.clone()),
            }
        });
        for edge in graph.edges(node) {
            merge_props(edge.props(), |key, value| {
                match out.edge_prop(from, &edge.label, key) {
                    Some(old) => debug_assert!(old == value, "conflicting edge property {key:?}"),
                    None => out.set_edge_prop(from, &edge.label, key, value.clone()),
                }
            });
        }
    }

    out
}

fn merge_props<P>(props: &BTreeMap<String, P>, mut apply: impl FnMut(&str, &P)) {
    for (key, value) in props {
        apply(key, value);
    }
}
