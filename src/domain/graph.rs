//! Dependency graph over timeline items
//!
//! Holds the *blocking* dependency edges of a timeline with cycle detection
//! and topological ordering. Uses petgraph for graph operations.
//!
//! The edge direction is `depends_on -> item`: the target must be satisfied
//! before the dependent item may proceed.

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::id::ItemId;
use super::item::{Dependency, ItemCore};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(ItemId, ItemId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(ItemId),

    #[error("Dependency graph contains a cycle")]
    Cyclic,
}

/// A dependency graph of timeline items
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Nodes in insertion order; edges carry the originating dependency
    graph: DiGraph<ItemId, Dependency>,

    node_map: HashMap<ItemId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the blocking subgraph for a set of items (in order)
    ///
    /// Edges to unknown targets are skipped; the resolver reports them as
    /// unresolved dependencies.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ItemCore>) -> Self {
        let mut graph = Self::new();

        // First pass: add all nodes
        let items: Vec<_> = items.into_iter().collect();
        for item in &items {
            graph.add_item(item.id.clone());
        }

        // Second pass: add all blocking edges
        for item in &items {
            for dep in item.dependencies.blocking() {
                let _ = graph.add_dependency(&item.id, dep.clone());
            }
        }

        graph
    }

    /// Adds an item to the graph
    pub fn add_item(&mut self, item_id: ItemId) {
        if !self.node_map.contains_key(&item_id) {
            let idx = self.graph.add_node(item_id.clone());
            self.node_map.insert(item_id, idx);
        }
    }

    /// Adds an edge without cycle checking
    pub fn add_dependency(&mut self, item: &ItemId, dep: Dependency) -> Result<(), GraphError> {
        self.insert_edge(item, dep).map(|_| ())
    }

    /// Adds an edge, rejecting it if it would close a cycle
    pub fn add_dependency_checked(
        &mut self,
        item: &ItemId,
        dep: Dependency,
    ) -> Result<(), GraphError> {
        let depends_on = dep.depends_on_id.clone();
        let edge = self.insert_edge(item, dep)?;

        if is_cyclic_directed(&self.graph) {
            // Remove the edge we just added
            self.graph.remove_edge(edge);
            return Err(GraphError::CycleDetected(item.clone(), depends_on));
        }

        Ok(())
    }

    fn insert_edge(&mut self, item: &ItemId, dep: Dependency) -> Result<EdgeIndex, GraphError> {
        if item == &dep.depends_on_id {
            return Err(GraphError::SelfDependency(item.clone()));
        }

        let item_idx = *self
            .node_map
            .get(item)
            .ok_or_else(|| GraphError::ItemNotFound(item.clone()))?;

        let dep_idx = *self
            .node_map
            .get(&dep.depends_on_id)
            .ok_or_else(|| GraphError::ItemNotFound(dep.depends_on_id.clone()))?;

        // Replace an existing edge between the same pair
        if let Some(edge) = self.graph.find_edge(dep_idx, item_idx) {
            self.graph.remove_edge(edge);
        }

        Ok(self.graph.add_edge(dep_idx, item_idx, dep))
    }

    /// Returns the direct blocking dependencies of an item
    pub fn dependencies(&self, item_id: &ItemId) -> Vec<ItemId> {
        self.neighbors(item_id, Direction::Incoming)
    }

    /// Returns the direct dependents of an item (items that depend on it)
    pub fn dependents(&self, item_id: &ItemId) -> Vec<ItemId> {
        self.neighbors(item_id, Direction::Outgoing)
    }

    fn neighbors(&self, item_id: &ItemId, direction: Direction) -> Vec<ItemId> {
        let Some(&idx) = self.node_map.get(item_id) else {
            return vec![];
        };

        let mut found: Vec<_> = self
            .graph
            .neighbors_directed(idx, direction)
            .collect();
        found.sort();
        found
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Incoming edges of an item as `(dependency target, edge)`
    pub fn incoming(&self, item_id: &ItemId) -> Vec<(&ItemId, &Dependency)> {
        let Some(&idx) = self.node_map.get(item_id) else {
            return vec![];
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect();
        edges.sort_by_key(|(src, _)| *src);
        edges
            .into_iter()
            .map(|(src, dep)| (&self.graph[src], dep))
            .collect()
    }

    /// Returns all items in topological order (dependencies before dependents)
    ///
    /// Among items with no ordering constraint, insertion order is kept.
    pub fn topological_order(&self) -> Result<Vec<ItemId>, GraphError> {
        if is_cyclic_directed(&self.graph) {
            return Err(GraphError::Cyclic);
        }

        // Kahn's algorithm with a min-heap on insertion index keeps output stable
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| std::cmp::Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(std::cmp::Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            order.push(self.graph[idx].clone());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(std::cmp::Reverse(next.index()));
                }
            }
        }

        Ok(order)
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Finds every elementary cycle
    ///
    /// A path-tracking DFS is started from every item that sits in a
    /// non-trivial strongly connected component, visiting only items of that
    /// component inserted no earlier than the start. Each cycle is therefore
    /// reported once, in edge order (dependency before dependent), beginning
    /// at its earliest-inserted item.
    pub fn find_cycles(&self) -> Vec<Vec<ItemId>> {
        let n = self.graph.node_count();
        let mut component = vec![usize::MAX; n];
        for (c, scc) in tarjan_scc(&self.graph).into_iter().enumerate() {
            // Self-loops are never inserted, so singletons are acyclic
            if scc.len() < 2 {
                continue;
            }
            for node in scc {
                component[node.index()] = c;
            }
        }

        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut cycles = Vec::new();
        let mut on_path = vec![false; n];

        for start in self.graph.node_indices() {
            let comp = component[start.index()];
            if comp == usize::MAX {
                continue;
            }

            // Iterative DFS: (node, sorted successors, next successor position)
            let mut path: Vec<NodeIndex> = vec![start];
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(start, self.sorted_successors(start), 0)];
            on_path[start.index()] = true;

            while let Some((node, succ, pos)) = stack.last_mut() {
                if *pos >= succ.len() {
                    on_path[node.index()] = false;
                    stack.pop();
                    path.pop();
                    continue;
                }
                let next = succ[*pos];
                *pos += 1;

                if next == start {
                    let cycle = normalize_cycle(path.iter().map(|n| n.index()).collect());
                    if seen.insert(cycle.clone()) {
                        cycles.push(
                            cycle
                                .into_iter()
                                .map(|i| self.graph[NodeIndex::new(i)].clone())
                                .collect(),
                        );
                    }
                } else if next.index() > start.index()
                    && component[next.index()] == comp
                    && !on_path[next.index()]
                {
                    on_path[next.index()] = true;
                    path.push(next);
                    let next_succ = self.sorted_successors(next);
                    stack.push((next, next_succ, 0));
                }
            }
        }

        cycles
    }

    fn sorted_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut succ: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        succ.sort();
        succ
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.node_map.contains_key(item_id)
    }

    /// Insertion position of an item, used for stable tie-breaking
    pub fn position(&self, item_id: &ItemId) -> Option<usize> {
        self.node_map.get(item_id).map(|idx| idx.index())
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Rotates a cycle of node indices to begin at its smallest index
fn normalize_cycle(mut cycle: Vec<usize>) -> Vec<usize> {
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle.rotate_left(min_pos);
    cycle
}
