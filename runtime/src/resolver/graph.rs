//! Dependency graph over an installed descriptor set
//!
//! Nodes are installed plugins, edges point from a plugin to each installed
//! dependency it declares and carry the declared constraint. Declarations
//! naming plugins that are not installed produce no edge; they are reported
//! by [`DependencyGraph::unmet_dependencies`] instead.
//!
//! Nodes are inserted in lexical name order, so `NodeIndex` order is name
//! order. Traversals below rely on that for deterministic results.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use super::error::DependencyError;
use crate::plugin::metadata::PluginDescriptor;
use crate::version::Constraint;

/// DFS marking for cycle detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not visited yet
    White,
    /// On the current DFS path
    Gray,
    /// Fully explored
    Black,
}

/// Directed graph of declared plugin dependencies
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<PluginDescriptor, Constraint>,
    index: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a descriptor set. When two descriptors share a
    /// name the first one wins.
    pub fn build<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginDescriptor>,
    {
        let mut sorted: Vec<&PluginDescriptor> = descriptors.into_iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted.dedup_by(|a, b| a.name == b.name);

        let mut graph = DiGraph::with_capacity(sorted.len(), sorted.len());
        let mut index = BTreeMap::new();
        for descriptor in sorted {
            let idx = graph.add_node(descriptor.clone());
            index.insert(descriptor.name.clone(), idx);
        }

        let edges: Vec<(NodeIndex, NodeIndex, Constraint)> = graph
            .node_indices()
            .flat_map(|from| {
                let index = &index;
                graph[from].dependencies.iter().filter_map(move |dep| {
                    index
                        .get(&dep.name)
                        .map(|&to| (from, to, dep.constraint.clone()))
                })
            })
            .collect();

        for (from, to, constraint) in edges {
            if graph.find_edge(from, to).is_none() {
                graph.add_edge(from, to, constraint);
            }
        }

        Self { graph, index }
    }

    /// Number of installed plugins
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the graph has no plugins
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges between installed plugins
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if a plugin is installed
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptor of an installed plugin
    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.index.get(name).map(|&idx| &self.graph[idx])
    }

    /// Installed plugin names in lexical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub(crate) fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub(crate) fn name_of(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].name
    }

    pub(crate) fn all_nodes(&self) -> BTreeSet<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Declared dependency names, installed or not, in declaration order
    pub fn direct_dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.descriptor(name)
            .map(|d| d.dependency_names().map(str::to_string).collect())
    }

    /// Installed plugins that declare a dependency on `name`, in lexical order
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let Some(idx) = self.node(name) else {
            return Vec::new();
        };
        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        dependents.sort();
        dependents
            .into_iter()
            .map(|n| self.name_of(n).to_string())
            .collect()
    }

    /// Unmet declarations of one plugin, in declaration order
    pub fn unmet_dependencies(&self, name: &str) -> Option<Vec<DependencyError>> {
        let descriptor = self.descriptor(name)?;
        let errors = descriptor
            .dependencies
            .iter()
            .filter_map(|dep| match self.descriptor(&dep.name) {
                None => Some(DependencyError::Missing {
                    plugin: descriptor.name.clone(),
                    dependency: dep.name.clone(),
                    constraint: dep.constraint.clone(),
                }),
                Some(installed) if !dep.constraint.matches(&installed.version) => {
                    Some(DependencyError::VersionConflict {
                        plugin: descriptor.name.clone(),
                        dependency: dep.name.clone(),
                        constraint: dep.constraint.clone(),
                        installed: installed.version.clone(),
                    })
                }
                Some(_) => None,
            })
            .collect();
        Some(errors)
    }

    /// `name` plus every installed plugin it transitively depends on
    pub(crate) fn closure(&self, name: &str) -> Option<BTreeSet<NodeIndex>> {
        let root = self.node(name)?;
        let mut seen = BTreeSet::from([root]);
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for dep in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        Some(seen)
    }

    /// Dependencies of `node` in lexical order
    fn sorted_dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        deps.sort();
        deps
    }

    /// Three-color DFS from each root in order. Every edge into a gray node
    /// yields one cycle: the DFS path from that node to the current one.
    pub(crate) fn find_cycles(&self, roots: impl IntoIterator<Item = NodeIndex>) -> Vec<Vec<String>> {
        let mut color = vec![Color::White; self.graph.node_count()];
        let mut cycles = Vec::new();

        for root in roots {
            if color[root.index()] != Color::White {
                continue;
            }
            color[root.index()] = Color::Gray;
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(root, self.sorted_dependencies(root), 0)];

            loop {
                let Some(frame) = stack.last_mut() else {
                    break;
                };
                let node = frame.0;
                let next = frame.1.get(frame.2).copied();
                frame.2 += 1;

                let Some(next) = next else {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    continue;
                };

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        stack.push((next, self.sorted_dependencies(next), 0));
                    }
                    Color::Gray => {
                        if let Some(start) = stack.iter().position(|(n, _, _)| *n == next) {
                            cycles.push(
                                stack[start..]
                                    .iter()
                                    .map(|(n, _, _)| self.name_of(*n).to_string())
                                    .collect(),
                            );
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        cycles
    }

    /// Kahn's algorithm over `scope`, dependencies first. Among nodes that
    /// become ready together the lexically smallest name goes first. Nodes
    /// on a cycle never become ready and are left out.
    pub(crate) fn topological_order(&self, scope: &BTreeSet<NodeIndex>) -> Vec<String> {
        let mut pending: BTreeMap<NodeIndex, usize> = scope
            .iter()
            .map(|&node| {
                let deps = self
                    .graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .filter(|dep| scope.contains(dep))
                    .count();
                (node, deps)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(&node, _)| Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(scope.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.name_of(node).to_string());
            for dependent in self.graph.neighbors_directed(node, Direction::Incoming) {
                if let Some(deps) = pending.get_mut(&dependent) {
                    *deps -= 1;
                    if *deps == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn plugin(name: &str, deps: &[&str]) -> PluginDescriptor {
        deps.iter().fold(
            PluginDescriptor::new(name, Version::new(1, 0, 0)),
            |d, dep| d.depends_on(*dep, Constraint::any()),
        )
    }

    #[test]
    fn test_build_skips_missing_targets() {
        let plugins = [plugin("a", &[]), plugin("b", &["a", "ghost"])];
        let graph = DependencyGraph::build(&plugins);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.direct_dependencies("b").unwrap(), vec!["a", "ghost"]);
        assert_eq!(graph.dependents("a"), vec!["b"]);
        assert!(graph.dependents("ghost").is_empty());
    }

    #[test]
    fn test_names_are_lexical() {
        let plugins = [plugin("zeta", &[]), plugin("alpha", &[]), plugin("mid", &[])];
        let graph = DependencyGraph::build(&plugins);
        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_closure() {
        let plugins = [
            plugin("a", &[]),
            plugin("b", &["a"]),
            plugin("c", &["b"]),
            plugin("d", &[]),
        ];
        let graph = DependencyGraph::build(&plugins);
        let closure: Vec<&str> = graph
            .closure("c")
            .unwrap()
            .into_iter()
            .map(|n| graph.name_of(n))
            .collect();
        assert_eq!(closure, vec!["a", "b", "c"]);
        assert!(graph.closure("nope").is_none());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plugins = [plugin("loop", &["loop"])];
        let graph = DependencyGraph::build(&plugins);
        let cycles = graph.find_cycles(graph.all_nodes());
        assert_eq!(cycles, vec![vec!["loop".to_string()]]);
    }

    #[test]
    fn test_kahn_leaves_out_cycle_members() {
        let plugins = [plugin("a", &[]), plugin("x", &["y"]), plugin("y", &["x"])];
        let graph = DependencyGraph::build(&plugins);
        assert_eq!(graph.topological_order(&graph.all_nodes()), vec!["a"]);
    }
}
