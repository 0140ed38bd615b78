// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// A node in the task dependency graph.
///
/// The registry exclusively owns every node through an `Arc`; edges are
/// weak references so that a cyclic graph built by a buggy forgefile does
/// not leak nodes.
#[derive(Debug)]
pub struct Graph {
    name: Arc<str>,
    edges: Mutex<Vec<Weak<Graph>>>,
}

#[derive(Debug)]
pub struct CyclicDependencyError {
    pub cycle: Vec<Arc<str>>,
}

impl Error for CyclicDependencyError {}
impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<&str> = self.cycle.iter().map(|n| n.as_ref()).collect();
        write!(f, "Cyclic dependency detected: {}", path.join(" -> "))
    }
}

impl Graph {
    pub fn new(name: &str) -> Arc<Graph> {
        Arc::new(Graph {
            name: Arc::from(name),
            edges: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Add an outgoing edge to another node.  Adding an edge to a node that
    /// is already adjacent is a no-op.
    pub fn add_edge(&self, edge: &Arc<Graph>) {
        let mut edges = self.edges.lock().unwrap();
        let already_present = edges
            .iter()
            .any(|e| e.upgrade().map(|n| Arc::ptr_eq(&n, edge)).unwrap_or(false));
        if !already_present {
            edges.push(Arc::downgrade(edge));
        }
    }

    /// Remove an outgoing edge by node identity.
    pub fn remove_edge(&self, edge: &Arc<Graph>) {
        let mut edges = self.edges.lock().unwrap();
        edges.retain(|e| match e.upgrade() {
            Some(n) => !Arc::ptr_eq(&n, edge),
            None => false,
        });
    }

    /// The adjacent (dependency) nodes, in the order the edges were added.
    pub fn edges(&self) -> Vec<Arc<Graph>> {
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.upgrade())
            .collect()
    }

    /// Depth-first post-order enumeration from this node.  Every dependency
    /// precedes its dependents in the returned order, and each node appears
    /// at most once.  Re-entering a node that is still on the active
    /// recursion stack is a cycle.
    pub fn topological_sort(self: &Arc<Graph>) -> Result<Vec<Arc<Graph>>, CyclicDependencyError> {
        let mut grey: Vec<Arc<Graph>> = Vec::new();
        let mut black: HashSet<*const Graph> = HashSet::new();
        let mut sorted: Vec<Arc<Graph>> = Vec::new();

        visit(self, &mut grey, &mut black, &mut sorted)?;

        Ok(sorted)
    }
}

fn visit(
    node: &Arc<Graph>,
    grey: &mut Vec<Arc<Graph>>,
    black: &mut HashSet<*const Graph>,
    sorted: &mut Vec<Arc<Graph>>,
) -> Result<(), CyclicDependencyError> {
    if black.contains(&Arc::as_ptr(node)) {
        return Ok(());
    }

    if let Some(start) = grey.iter().position(|g| Arc::ptr_eq(g, node)) {
        let mut cycle: Vec<Arc<str>> = grey[start..].iter().map(|g| g.name()).collect();
        cycle.push(node.name());
        return Err(CyclicDependencyError { cycle });
    }

    grey.push(node.clone());

    for edge in node.edges() {
        visit(&edge, grey, black, sorted)?;
    }

    grey.pop();
    black.insert(Arc::as_ptr(node));
    sorted.push(node.clone());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[Arc<Graph>]) -> Vec<String> {
        nodes.iter().map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_topological_sort_chain() {
        let a = Graph::new("a");
        let b = Graph::new("b");
        let c = Graph::new("c");
        c.add_edge(&b);
        b.add_edge(&a);

        let sorted = c.topological_sort().unwrap();
        assert_eq!(names(&sorted), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topological_sort_diamond_visits_once() {
        let a = Graph::new("a");
        let b = Graph::new("b");
        let c = Graph::new("c");
        let d = Graph::new("d");
        b.add_edge(&a);
        c.add_edge(&a);
        d.add_edge(&b);
        d.add_edge(&c);

        let sorted = d.topological_sort().unwrap();
        let order = names(&sorted);

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");

        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_cycle_detected() {
        let a = Graph::new("a");
        let b = Graph::new("b");
        let c = Graph::new("c");
        a.add_edge(&b);
        b.add_edge(&c);
        c.add_edge(&a);

        let err = a.topological_sort().unwrap_err();
        assert!(err.cycle.len() >= 2);
        assert_eq!(err.cycle.first().unwrap().as_ref(), "a");
        assert_eq!(err.cycle.last().unwrap().as_ref(), "a");

        // Deterministic: a second enumeration fails the same way
        let err2 = a.topological_sort().unwrap_err();
        assert_eq!(
            err.cycle.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            err2.cycle.iter().map(|n| n.to_string()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_remove_edge() {
        let a = Graph::new("a");
        let b = Graph::new("b");
        b.add_edge(&a);
        assert_eq!(b.edges().len(), 1);
        b.remove_edge(&a);
        assert_eq!(b.edges().len(), 0);
    }

    #[test]
    fn test_self_cycle() {
        let a = Graph::new("a");
        a.add_edge(&a);
        let err = a.topological_sort().unwrap_err();
        assert_eq!(err.cycle.len(), 2);
    }
}
