//! Dependency Graph Resolver
//!
//! Validates the declared dependencies of an installed plugin set and turns
//! it into a deterministic load order.
//!
//! # Resolution
//!
//! 1. Build a [`DependencyGraph`] from the descriptors.
//! 2. Check every declaration: missing plugins and version conflicts are
//!    collected as separate error categories.
//! 3. Run three-color DFS cycle detection; each back edge is reported with
//!    the plugins forming the loop.
//! 4. If anything above failed, resolution fails closed with an empty order.
//!    Otherwise Kahn's algorithm produces the order, dependencies first,
//!    lexically smallest ready plugin first.
//!
//! The resolver never mutates anything; the graph is rebuilt from the
//! installed set on every request.

mod error;
mod graph;

pub use error::DependencyError;
pub use graph::DependencyGraph;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::plugin::metadata::PluginDescriptor;

/// Outcome of a load-order computation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Plugins in load order; empty when `errors` is not
    pub order: Vec<String>,

    /// Everything that prevented resolution
    pub errors: Vec<DependencyError>,
}

impl Resolution {
    /// Check if the set resolved cleanly
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Rendered error messages
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Cycles reported in `errors`
    pub fn cycles(&self) -> Vec<&[String]> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                DependencyError::Circular { cycle } => Some(cycle.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Convert into the order or the collected errors
    pub fn into_result(self) -> Result<Vec<String>, Vec<DependencyError>> {
        if self.errors.is_empty() {
            Ok(self.order)
        } else {
            Err(self.errors)
        }
    }
}

/// Result of checking one plugin's declarations against the installed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyReport {
    /// The checked plugin
    pub plugin: String,

    /// Declarations that are not satisfied
    pub unmet: Vec<DependencyError>,
}

impl DependencyReport {
    /// Check if every declared dependency is satisfied
    pub fn is_satisfied(&self) -> bool {
        self.unmet.is_empty()
    }

    /// Unmet constraints rendered as `A >=2.0.0 (installed 1.0.0)`
    pub fn missing(&self) -> Vec<String> {
        self.unmet.iter().map(DependencyError::description).collect()
    }
}

/// Direct dependencies of every plugin reachable from a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    /// The plugin the traversal started from
    pub root: String,

    /// Installed plugin name to its declared dependency names
    pub edges: BTreeMap<String, Vec<String>>,

    /// Declared dependencies that are not installed
    pub missing: BTreeSet<String>,

    /// First loop met during the traversal, if any
    pub cycle: Option<Vec<String>>,
}

/// Dependency resolver over one snapshot of the installed set
#[derive(Debug, Clone)]
pub struct Resolver {
    graph: DependencyGraph,
}

impl Resolver {
    /// Snapshot the descriptors into a fresh graph
    pub fn new<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginDescriptor>,
    {
        Self {
            graph: DependencyGraph::build(descriptors),
        }
    }

    /// The underlying graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Check one plugin's declarations. `None` if it is not installed.
    pub fn check_dependencies(&self, name: &str) -> Option<DependencyReport> {
        let unmet = self.graph.unmet_dependencies(name)?;
        Some(DependencyReport {
            plugin: name.to_string(),
            unmet,
        })
    }

    /// Global load order across every installed plugin
    pub fn resolve_load_order(&self) -> Resolution {
        let scope = self.graph.all_nodes();
        let resolution = self.resolve(&scope);
        debug!(
            plugins = scope.len(),
            errors = resolution.errors.len(),
            "Resolved global load order"
        );
        resolution
    }

    /// Load order of `name` and its transitive dependencies, ending with
    /// `name`. `None` if it is not installed.
    pub fn resolve_load_order_for(&self, name: &str) -> Option<Resolution> {
        let scope = self.graph.closure(name)?;
        let resolution = self.resolve(&scope);
        debug!(
            plugin = %name,
            closure = scope.len(),
            errors = resolution.errors.len(),
            "Resolved load order"
        );
        Some(resolution)
    }

    fn resolve(&self, scope: &BTreeSet<NodeIndex>) -> Resolution {
        let mut errors: Vec<DependencyError> = scope
            .iter()
            .flat_map(|&node| {
                self.graph
                    .unmet_dependencies(self.graph.name_of(node))
                    .unwrap_or_default()
            })
            .collect();

        errors.extend(
            self.graph
                .find_cycles(scope.iter().copied())
                .into_iter()
                .map(|cycle| DependencyError::Circular { cycle }),
        );

        if !errors.is_empty() {
            return Resolution {
                order: Vec::new(),
                errors,
            };
        }

        Resolution {
            order: self.graph.topological_order(scope),
            errors,
        }
    }

    /// Walk the declared dependencies from `name`. Loops are not followed;
    /// the first one found is reported in `cycle`. `None` if `name` is not
    /// installed.
    pub fn dependency_tree(&self, name: &str) -> Option<DependencyTree> {
        let root = self.graph.node(name)?;
        let mut tree = DependencyTree {
            root: name.to_string(),
            edges: BTreeMap::new(),
            missing: BTreeSet::new(),
            cycle: None,
        };

        let mut path: Vec<String> = Vec::new();
        self.walk(self.graph.name_of(root), &mut path, &mut tree);
        Some(tree)
    }

    fn walk(&self, name: &str, path: &mut Vec<String>, tree: &mut DependencyTree) {
        let Some(deps) = self.graph.direct_dependencies(name) else {
            tree.missing.insert(name.to_string());
            return;
        };
        tree.edges.insert(name.to_string(), deps.clone());
        path.push(name.to_string());

        for dep in &deps {
            if let Some(start) = path.iter().position(|p| p == dep) {
                if tree.cycle.is_none() {
                    tree.cycle = Some(path[start..].to_vec());
                }
                continue;
            }
            if tree.edges.contains_key(dep) || tree.missing.contains(dep) {
                continue;
            }
            self.walk(dep, path, tree);
        }

        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn plugin(name: &str, version: &str, deps: &[(&str, &str)]) -> PluginDescriptor {
        deps.iter().fold(
            PluginDescriptor::parse(name, version).unwrap(),
            |d, (dep, constraint)| d.with_dependency(*dep, constraint).unwrap(),
        )
    }

    #[test]
    fn test_simple_chain_order() {
        let plugins = [
            plugin("B", "1.0.0", &[("A", ">=1.0.0")]),
            plugin("A", "1.0.0", &[]),
        ];
        let resolution = Resolver::new(&plugins).resolve_load_order();
        assert!(resolution.is_ok());
        assert_eq!(resolution.order, vec!["A", "B"]);
    }

    #[test]
    fn test_version_conflict_report() {
        let plugins = [
            plugin("A", "1.0.0", &[]),
            plugin("B", "1.0.0", &[("A", ">=2.0.0")]),
        ];
        let resolver = Resolver::new(&plugins);

        let report = resolver.check_dependencies("B").unwrap();
        assert!(!report.is_satisfied());
        assert_eq!(report.missing(), vec!["A >=2.0.0 (installed 1.0.0)"]);

        assert!(resolver.check_dependencies("A").unwrap().is_satisfied());
        assert!(resolver.check_dependencies("Z").is_none());

        let resolution = resolver.resolve_load_order();
        assert!(!resolution.is_ok());
        assert!(resolution.order.is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        let plugins = [
            plugin("X", "1.0.0", &[("Y", "*")]),
            plugin("Y", "1.0.0", &[("X", "*")]),
        ];
        let resolution = Resolver::new(&plugins).resolve_load_order();
        assert!(!resolution.is_ok());
        assert!(resolution.order.is_empty());
        assert_eq!(resolution.cycles(), vec![["X".to_string(), "Y".to_string()].as_slice()]);
    }

    #[test]
    fn test_four_node_cycle_reports_only_loop_members() {
        let plugins = [
            plugin("entry", "1.0.0", &[("a", "*")]),
            plugin("a", "1.0.0", &[("b", "*")]),
            plugin("b", "1.0.0", &[("c", "*")]),
            plugin("c", "1.0.0", &[("d", "*")]),
            plugin("d", "1.0.0", &[("a", "*")]),
            plugin("solo", "1.0.0", &[]),
        ];
        let resolution = Resolver::new(&plugins).resolve_load_order();
        let cycles = resolution.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], ["a", "b", "c", "d"].map(String::from).as_slice());
    }

    #[test]
    fn test_missing_is_distinct_from_conflict() {
        let plugins = [plugin("B", "1.0.0", &[("A", ">=1.0.0")])];
        let resolution = Resolver::new(&plugins).resolve_load_order();
        assert_eq!(
            resolution.errors,
            vec![DependencyError::Missing {
                plugin: "B".into(),
                dependency: "A".into(),
                constraint: ">=1.0.0".parse().unwrap(),
            }]
        );
        assert_eq!(
            resolution.errors[0].description(),
            "A >=1.0.0 (not installed)"
        );
    }

    #[test]
    fn test_lexical_tie_break() {
        let plugins = [
            plugin("web", "1.0.0", &[("db", "*"), ("cache", "*")]),
            plugin("db", "1.0.0", &[("log", "*")]),
            plugin("cache", "1.0.0", &[]),
            plugin("log", "1.0.0", &[]),
            plugin("audit", "1.0.0", &[("log", "*")]),
        ];
        let resolution = Resolver::new(&plugins).resolve_load_order();
        // cache and log start ready; audit and db become ready after log
        assert_eq!(resolution.order, vec!["cache", "log", "audit", "db", "web"]);
    }

    #[test]
    fn test_order_is_deterministic_across_input_orders() {
        let mut plugins = vec![
            plugin("a", "1.0.0", &[]),
            plugin("b", "1.0.0", &[("a", "*")]),
            plugin("c", "1.0.0", &[("a", "*")]),
            plugin("d", "1.0.0", &[("b", "*"), ("c", "*")]),
            plugin("e", "1.0.0", &[]),
        ];
        let expected = Resolver::new(&plugins).resolve_load_order().order;
        for _ in 0..5 {
            plugins.rotate_left(2);
            plugins.reverse();
            assert_eq!(Resolver::new(&plugins).resolve_load_order().order, expected);
        }
    }

    #[test]
    fn test_resolve_for_closure_only() {
        let plugins = [
            plugin("a", "1.0.0", &[]),
            plugin("b", "1.0.0", &[("a", "*")]),
            plugin("c", "1.0.0", &[("b", "*")]),
            plugin("broken", "1.0.0", &[("ghost", "*")]),
        ];
        let resolver = Resolver::new(&plugins);

        let resolution = resolver.resolve_load_order_for("c").unwrap();
        assert!(resolution.is_ok());
        assert_eq!(resolution.order, vec!["a", "b", "c"]);

        // Errors outside the closure do not leak in, but the global order fails
        assert!(!resolver.resolve_load_order().is_ok());
        assert!(!resolver.resolve_load_order_for("broken").unwrap().is_ok());
        assert!(resolver.resolve_load_order_for("nope").is_none());
    }

    #[test]
    fn test_dependency_tree() {
        let plugins = [
            plugin("a", "1.0.0", &[]),
            plugin("b", "1.0.0", &[("a", "*")]),
            plugin("c", "1.0.0", &[("b", "*"), ("a", "*"), ("ghost", "*")]),
        ];
        let tree = Resolver::new(&plugins).dependency_tree("c").unwrap();
        assert_eq!(tree.edges["c"], vec!["b", "a", "ghost"]);
        assert_eq!(tree.edges["b"], vec!["a"]);
        assert!(tree.edges["a"].is_empty());
        assert!(tree.missing.contains("ghost"));
        assert_eq!(tree.cycle, None);
    }

    #[test]
    fn test_dependency_tree_marks_cycle() {
        let plugins = [
            plugin("X", "1.0.0", &[("Y", "*")]),
            plugin("Y", "1.0.0", &[("X", "*")]),
        ];
        let tree = Resolver::new(&plugins).dependency_tree("X").unwrap();
        assert_eq!(tree.edges.len(), 2);
        assert_eq!(tree.cycle, Some(vec!["X".to_string(), "Y".to_string()]));
    }

    #[test]
    fn test_prerelease_dependency_conflict() {
        let plugins = [
            plugin("core", "2.0.0-beta", &[]),
            plugin("app", "1.0.0", &[("core", ">=2.0.0")]),
        ];
        let report = Resolver::new(&plugins).check_dependencies("app").unwrap();
        assert_eq!(report.missing(), vec!["core >=2.0.0 (installed 2.0.0-beta)"]);
        assert_eq!(
            Resolver::new(&plugins).graph().descriptor("core").unwrap().version,
            Version::new(2, 0, 0).with_pre("beta")
        );
    }
}
