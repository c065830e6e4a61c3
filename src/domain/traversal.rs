//! Traversal Engine
//!
//! Breadth-first walk over a [`CallGraph`] from a root symbol, producing the
//! visitation order, the BFS tree and depth from the root.

use crate::domain::callgraph::CallGraph;
use crate::domain::symbol_table::SymbolTable;
use std::collections::{HashMap, HashSet, VecDeque};

/// Result of one BFS from a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRecord {
    /// Visitation order; `order[0]` is the root.
    pub order: Vec<String>,
    /// Discovering caller of every non-root node.
    pub parent: HashMap<String, String>,
    pub depth: HashMap<String, usize>,
}

impl TraversalRecord {
    pub fn root(&self) -> &str {
        &self.order[0]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.depth.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tree children of each node, sorted by name.
    pub fn children(&self) -> HashMap<&str, Vec<&str>> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (child, parent) in &self.parent {
            children.entry(parent.as_str()).or_default().push(child.as_str());
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }
        children
    }
}

/// Breadth-first traversal of `graph` from `root`.
///
/// Nodes are never revisited, so cycles collapse and the first discovered
/// path wins. A root without edges yields a single-node record.
pub fn traverse(graph: &CallGraph, root: &str) -> TraversalRecord {
    let mut order = Vec::new();
    let mut parent = HashMap::new();
    let mut depth = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();

    visited.insert(root.to_string());
    depth.insert(root.to_string(), 0);
    queue.push_back(root.to_string());

    while let Some(caller) = queue.pop_front() {
        let caller_depth = depth[&caller];
        for callee in graph.callees(&caller) {
            if visited.insert(callee.to_string()) {
                parent.insert(callee.to_string(), caller.clone());
                depth.insert(callee.to_string(), caller_depth + 1);
                queue.push_back(callee.to_string());
            }
        }
        order.push(caller);
    }

    TraversalRecord { order, parent, depth }
}

/// Traverse only if `root` is known to the symbol table or the call graph.
pub fn traverse_from_root(
    graph: &CallGraph,
    symbols: &SymbolTable,
    root: &str,
) -> Option<TraversalRecord> {
    if !symbols.contains(root) && !graph.contains(root) {
        return None;
    }
    Some(traverse(graph, root))
}

/// What the tree printer shows for one node.
#[derive(Debug, Clone, Default)]
pub struct TreeLabel {
    pub is_project: bool,
    pub location: Option<String>,
}

/// Indented text rendering of a BFS tree.
pub struct CallTree<'a> {
    record: &'a TraversalRecord,
}

impl<'a> CallTree<'a> {
    pub fn new(record: &'a TraversalRecord) -> Self {
        Self { record }
    }

    pub fn render<F>(&self, describe: F) -> String
    where
        F: Fn(&str) -> TreeLabel,
    {
        let children = self.record.children();
        let mut lines = Vec::new();
        let mut stack: Vec<(&str, usize)> = vec![(self.record.root(), 0)];

        while let Some((name, indent)) = stack.pop() {
            let label = describe(name);
            let marker = if label.is_project { "[P]" } else { "[EXT]" };
            let loc = label
                .location
                .map(|l| format!(" ({})", l))
                .unwrap_or_default();
            lines.push(format!(
                "{}{} [d={}] {}{}",
                "  ".repeat(indent),
                marker,
                self.record.depth[name],
                name,
                loc
            ));
            if let Some(kids) = children.get(name) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, indent + 1));
                }
            }
        }

        lines.join("\n")
    }
}
