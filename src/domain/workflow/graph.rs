//! Graph index over a workflow structure for traversal and analysis

use std::collections::{HashMap, HashSet, VecDeque};

use super::edge::Edge;
use super::node::{Node, NodeId};

/// Adjacency view of a node and edge set
///
/// Edges whose endpoints are not part of the node set are ignored; the
/// validator reports them separately.
#[derive(Debug, Clone)]
pub struct Graph<'a> {
    nodes: HashMap<&'a NodeId, &'a Node>,
    edges: &'a [Edge],
    /// node -> indices of outgoing edges
    outgoing: HashMap<&'a NodeId, Vec<usize>>,
    /// node -> indices of incoming edges
    incoming: HashMap<&'a NodeId, Vec<usize>>,
    /// Nodes with no incoming edges, in declaration order
    entry_points: Vec<&'a NodeId>,
    /// Edges closing a cycle in a depth-first walk from the entry points
    back_edges: HashSet<usize>,
    /// Nodes reachable from an entry point
    reachable: HashSet<&'a NodeId>,
    /// Edges from a node on a cycle to a node that cannot lead back to it
    loop_exits: HashSet<usize>,
}

impl<'a> Graph<'a> {
    pub fn new(nodes: &'a [Node], edges: &'a [Edge]) -> Self {
        let node_map: HashMap<&NodeId, &Node> = nodes.iter().map(|n| (n.id(), n)).collect();
        let mut outgoing: HashMap<&NodeId, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<&NodeId, Vec<usize>> = HashMap::new();

        for node in nodes {
            outgoing.entry(node.id()).or_default();
            incoming.entry(node.id()).or_default();
        }

        for (index, edge) in edges.iter().enumerate() {
            if !node_map.contains_key(edge.source()) || !node_map.contains_key(edge.target()) {
                continue;
            }
            outgoing.entry(edge.source()).or_default().push(index);
            incoming.entry(edge.target()).or_default().push(index);
        }

        let mut seen = HashSet::new();
        let entry_points: Vec<&NodeId> = nodes
            .iter()
            .map(|n| n.id())
            .filter(|id| incoming.get(id).is_none_or(|v| v.is_empty()))
            .filter(|id| seen.insert(*id))
            .collect();

        let mut graph = Self {
            nodes: node_map,
            edges,
            outgoing,
            incoming,
            entry_points,
            back_edges: HashSet::new(),
            reachable: HashSet::new(),
            loop_exits: HashSet::new(),
        };
        graph.classify_edges();
        graph.classify_loop_exits();
        graph
    }

    /// Depth-first walk from every entry point marking back edges and reachability
    fn classify_edges(&mut self) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnStack,
            Done,
        }

        let edges = self.edges;
        let mut marks: HashMap<&'a NodeId, Mark> = HashMap::new();

        for entry in self.entry_points.clone() {
            if marks.contains_key(entry) {
                continue;
            }

            // (node, next outgoing position)
            let mut stack: Vec<(&'a NodeId, usize)> = vec![(entry, 0)];
            marks.insert(entry, Mark::OnStack);
            self.reachable.insert(entry);

            while let Some((node, position)) = stack.pop() {
                let outgoing = self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[]);

                if position >= outgoing.len() {
                    marks.insert(node, Mark::Done);
                    continue;
                }

                stack.push((node, position + 1));
                let edge_index = outgoing[position];
                let target = edges[edge_index].target();

                match marks.get(target) {
                    Some(Mark::OnStack) => {
                        self.back_edges.insert(edge_index);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some((key, _)) = self.nodes.get_key_value(target) {
                            marks.insert(*key, Mark::OnStack);
                            self.reachable.insert(*key);
                            stack.push((*key, 0));
                        }
                    }
                }
            }
        }
    }

    /// Mark edges that leave the strongly connected component of their source
    ///
    /// Only sources that lie on a cycle qualify; an edge between two nodes
    /// of the same component stays inside the loop.
    fn classify_loop_exits(&mut self) {
        let successors: HashMap<&'a NodeId, HashSet<&'a NodeId>> = self
            .nodes
            .keys()
            .map(|id| (*id, self.successors_of(id)))
            .collect();

        let edges = self.edges;
        for (index, edge) in edges.iter().enumerate() {
            let (Some(source), Some(target)) =
                (successors.get(edge.source()), successors.get(edge.target()))
            else {
                continue;
            };

            let source_on_cycle = source.contains(edge.source());
            let returns = edge.target() == edge.source() || target.contains(edge.source());
            if source_on_cycle && !returns {
                self.loop_exits.insert(index);
            }
        }
    }

    /// Nodes reachable from `id` through at least one edge
    fn successors_of(&self, id: &NodeId) -> HashSet<&'a NodeId> {
        let edges = self.edges;
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.outgoing(id).iter().copied().collect();

        while let Some(index) = queue.pop_front() {
            let target = edges[index].target();
            if let Some((key, _)) = self.nodes.get_key_value(target) {
                if seen.insert(*key) {
                    queue.extend(self.outgoing(key).iter().copied());
                }
            }
        }

        seen
    }

    pub fn node(&self, id: &NodeId) -> Option<&'a Node> {
        self.nodes.get(id).copied()
    }

    pub fn edge(&self, index: usize) -> &'a Edge {
        &self.edges[index]
    }

    pub fn entry_points(&self) -> &[&'a NodeId] {
        &self.entry_points
    }

    pub fn outgoing(&self, id: &NodeId) -> &[usize] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: &NodeId) -> &[usize] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_back_edge(&self, index: usize) -> bool {
        self.back_edges.contains(&index)
    }

    /// Whether the edge leaves a loop its source is part of
    pub fn is_loop_exit(&self, index: usize) -> bool {
        self.loop_exits.contains(&index)
    }

    /// Incoming edges that must deliver a signal before the node may run
    pub fn forward_incoming(&self, id: &NodeId) -> impl Iterator<Item = usize> + '_ {
        self.incoming(id)
            .iter()
            .copied()
            .filter(|i| !self.back_edges.contains(i))
    }

    pub fn is_reachable(&self, id: &NodeId) -> bool {
        self.reachable.contains(id)
    }

    /// A cycle formed only by unconditional edges, if one exists
    ///
    /// Returns the node ids along the cycle in traversal order.
    pub fn unconditional_cycle(&self, nodes: &'a [Node]) -> Option<Vec<NodeId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnStack,
            Done,
        }

        let mut marks: HashMap<&NodeId, Mark> = HashMap::new();

        for start in nodes.iter().map(|n| n.id()) {
            if marks.contains_key(start) {
                continue;
            }

            let mut path: Vec<&NodeId> = vec![start];
            let mut stack: Vec<(&NodeId, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::OnStack);

            while let Some((node, position)) = stack.pop() {
                let outgoing = self.outgoing(node);

                if position >= outgoing.len() {
                    marks.insert(node, Mark::Done);
                    path.pop();
                    continue;
                }

                stack.push((node, position + 1));
                let edge = &self.edges[outgoing[position]];
                if edge.is_conditional() {
                    continue;
                }

                let target = edge.target();
                match marks.get(target) {
                    Some(Mark::OnStack) => {
                        let start_at = path.iter().position(|id| *id == target).unwrap_or(0);
                        return Some(path[start_at..].iter().map(|id| (*id).clone()).collect());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some((key, _)) = self.nodes.get_key_value(target) {
                            marks.insert(*key, Mark::OnStack);
                            path.push(*key);
                            stack.push((*key, 0));
                        }
                    }
                }
            }
        }

        None
    }
}
