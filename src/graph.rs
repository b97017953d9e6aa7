//! Dependency graph (C8): bidirectional map between dependencies and
//! dependents, cycle detection, and invalidation-chain traversal.
//!
//! Uses `BTreeMap`/`BTreeSet` rather than hash-based collections both for
//! deterministic iteration order (§8 invariant 6: "stable within a run")
//! and because it mirrors the ancestor compiler's own import-edge storage
//! (`GraphEdges`), which is `BTreeMap`-backed for the same reason.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Two owned maps with pure set operations; no back-pointers are stored on
/// file records at rest (§9: "dependents are recomputed per batch").
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    deps: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `f` has an entry in both maps, even with no edges. Needed so
    /// a freshly-added file with zero dependencies still appears in
    /// `getDependents`/`getDependencies` queries as an empty set rather
    /// than absent.
    pub fn ensure_node(&mut self, f: &str) {
        self.deps.entry(f.to_string()).or_default();
        self.dependents.entry(f.to_string()).or_default();
    }

    pub fn add_dep(&mut self, f: &str, g: &str) {
        self.ensure_node(f);
        self.ensure_node(g);
        self.deps.get_mut(f).unwrap().insert(g.to_string());
        self.dependents.get_mut(g).unwrap().insert(f.to_string());
    }

    pub fn remove_dep(&mut self, f: &str, g: &str) {
        if let Some(set) = self.deps.get_mut(f) {
            set.remove(g);
        }
        if let Some(set) = self.dependents.get_mut(g) {
            set.remove(f);
        }
    }

    pub fn remove_node(&mut self, f: &str) {
        if let Some(targets) = self.deps.remove(f) {
            for g in &targets {
                if let Some(set) = self.dependents.get_mut(g) {
                    set.remove(f);
                }
            }
        }
        if let Some(sources) = self.dependents.remove(f) {
            for g in &sources {
                if let Some(set) = self.deps.get_mut(g) {
                    set.remove(f);
                }
            }
        }
    }

    /// Replaces `f`'s outgoing edges with `new_deps`, updating the
    /// dependents side symmetrically.
    pub fn update_file(&mut self, f: &str, new_deps: BTreeSet<String>) {
        self.ensure_node(f);
        let old_deps = self.deps.get(f).cloned().unwrap_or_default();
        for removed in old_deps.difference(&new_deps) {
            self.remove_dep(f, removed);
        }
        for added in new_deps.difference(&old_deps) {
            self.add_dep(f, added);
        }
    }

    pub fn get_dependents(&self, f: &str) -> BTreeSet<String> {
        self.dependents.get(f).cloned().unwrap_or_default()
    }

    pub fn get_dependencies(&self, f: &str) -> BTreeSet<String> {
        self.deps.get(f).cloned().unwrap_or_default()
    }

    /// Reverse-direction BFS from `f` over `dependents`. Returns a list
    /// starting with `f`; no node appears twice (§8 invariant 6).
    pub fn invalidation_chain(&self, f: &str) -> Vec<String> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(f.to_string());
        visited.insert(f.to_string());

        while let Some(node) = queue.pop_front() {
            order.push(node.clone());
            for dependent in self.get_dependents(&node) {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    /// DFS with a recursion stack; reports each cycle as the slice of the
    /// current path from the back-edge target through the current node.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = BTreeSet::new();
        let mut on_stack = Vec::new();
        let mut on_stack_set = BTreeSet::new();

        for node in self.deps.keys() {
            if !visited.contains(node) {
                self.dfs_cycles(node, &mut visited, &mut on_stack, &mut on_stack_set, &mut cycles);
            }
        }
        cycles
    }

    fn dfs_cycles(
        &self,
        node: &str,
        visited: &mut BTreeSet<String>,
        on_stack: &mut Vec<String>,
        on_stack_set: &mut BTreeSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node.to_string());
        on_stack.push(node.to_string());
        on_stack_set.insert(node.to_string());

        for dep in self.get_dependencies(node) {
            if let Some(pos) = on_stack.iter().position(|n| n == &dep) {
                let mut cycle: Vec<String> = on_stack[pos..].to_vec();
                cycle.push(dep.clone());
                cycles.push(cycle);
            } else if !visited.contains(&dep) {
                self.dfs_cycles(&dep, visited, on_stack, on_stack_set, cycles);
            }
        }

        on_stack.pop();
        on_stack_set.remove(node);
    }

    /// Debug-only invariant check: `g ∈ deps[f] ⇔ f ∈ dependents[g]` (§8
    /// invariant 2). Not called on the hot path; exercised by tests and
    /// available for callers that want to assert consistency after a bulk
    /// mutation.
    pub fn check_invariant(&self) -> Result<(), crate::error::GraphError> {
        for (f, targets) in &self.deps {
            for g in targets {
                let back_edge_present = self.dependents.get(g).map(|set| set.contains(f)).unwrap_or(false);
                if !back_edge_present {
                    return Err(crate::error::GraphError::AsymmetricEdge(f.into(), g.into()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_dep_is_bidirectional() {
        let mut g = DependencyGraph::new();
        g.add_dep("main.ts", "utils.ts");
        assert!(g.get_dependencies("main.ts").contains("utils.ts"));
        assert!(g.get_dependents("utils.ts").contains("main.ts"));
        assert!(g.check_invariant().is_ok());
    }

    #[test]
    fn remove_node_clears_both_sides() {
        let mut g = DependencyGraph::new();
        g.add_dep("main.ts", "utils.ts");
        g.add_dep("other.ts", "utils.ts");
        g.remove_node("utils.ts");
        assert!(g.get_dependencies("main.ts").is_empty());
        assert!(g.get_dependencies("other.ts").is_empty());
        assert!(g.check_invariant().is_ok());
    }

    #[test]
    fn invalidation_chain_starts_with_self_and_has_no_duplicates() {
        let mut g = DependencyGraph::new();
        g.add_dep("main.ts", "utils.ts");
        g.add_dep("other.ts", "utils.ts");
        let chain = g.invalidation_chain("utils.ts");
        assert_eq!(chain[0], "utils.ts");
        let unique: BTreeSet<_> = chain.iter().collect();
        assert_eq!(unique.len(), chain.len());
        assert!(chain.contains(&"main.ts".to_string()));
        assert!(chain.contains(&"other.ts".to_string()));
    }

    #[test]
    fn detects_two_file_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dep("a.ts", "b.ts");
        g.add_dep("b.ts", "a.ts");
        let cycles = g.detect_cycles();
        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn update_file_rewires_changed_dependencies() {
        let mut g = DependencyGraph::new();
        g.add_dep("main.ts", "old.ts");
        let mut new_deps = BTreeSet::new();
        new_deps.insert("new.ts".to_string());
        g.update_file("main.ts", new_deps);
        assert!(!g.get_dependencies("main.ts").contains("old.ts"));
        assert!(g.get_dependencies("main.ts").contains("new.ts"));
        assert!(!g.get_dependents("old.ts").contains("main.ts"));
        assert!(g.get_dependents("new.ts").contains("main.ts"));
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let mut g = DependencyGraph::new();
        g.add_dep("main.ts", "utils.ts");
        g.add_dep("utils.ts", "shared.ts");
        assert!(g.detect_cycles().is_empty());
    }
}
