// Call graph structures for callreplay.
// Caller -> callee adjacency recovered from a disassembly listing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Matches a function label such as `800001c8 <main>:`.
static FUNC_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]+\s+<([^>]+)>:").expect("valid header pattern"));

/// The call graph itself.
///
/// Target sets are ordered, so every enumeration of callees is lexicographic
/// and traversal order is reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `caller -> callee`. Repeated edges collapse into one.
    pub fn add_edge(&mut self, caller_id: &str, callee_id: &str) {
        self.adjacency
            .entry(caller_id.to_string())
            .or_default()
            .insert(callee_id.to_string());
    }

    /// Register a function with no calls yet.
    pub fn add_node(&mut self, id: &str) {
        self.adjacency.entry(id.to_string()).or_default();
    }

    pub fn callees(&self, caller_id: &str) -> impl Iterator<Item = &str> + '_ {
        self.adjacency
            .get(caller_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn calls(&self, caller_id: &str, callee_id: &str) -> bool {
        self.adjacency
            .get(caller_id)
            .is_some_and(|set| set.contains(callee_id))
    }

    /// True if `id` appears as a caller or as a callee.
    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id) || self.adjacency.values().any(|set| set.contains(id))
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum()
    }

    pub fn adjacency(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.adjacency
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for CallGraph {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut graph = CallGraph::new();
        for (caller, callee) in iter {
            graph.add_edge(caller, callee);
        }
        graph
    }
}

/// Extracts a [`CallGraph`] from `objdump -d` style text.
#[derive(Debug, Clone)]
pub struct DisassemblyParser {
    call_mnemonics: Vec<String>,
}

impl Default for DisassemblyParser {
    fn default() -> Self {
        // `jal` also covers `jalr`.
        Self::new(vec!["jal".to_string()])
    }
}

impl DisassemblyParser {
    pub fn new(call_mnemonics: Vec<String>) -> Self {
        Self { call_mnemonics }
    }

    pub fn parse(&self, disassembly: &str) -> CallGraph {
        let mut graph = CallGraph::new();
        let mut current_func: Option<String> = None;

        for line in disassembly.lines() {
            if let Some(caps) = FUNC_HEADER.captures(line.trim()) {
                let name = caps[1].to_string();
                graph.add_node(&name);
                current_func = Some(name);
                continue;
            }

            // Nothing before the first label belongs to a function.
            let Some(caller) = current_func.as_deref() else {
                continue;
            };

            if !self.is_call(line) {
                continue;
            }
            if let Some(callee) = bracketed_target(line) {
                graph.add_edge(caller, callee);
            }
        }

        graph
    }

    fn is_call(&self, line: &str) -> bool {
        self.call_mnemonics.iter().any(|m| line.contains(m.as_str()))
    }
}

/// Text between the first `<` and the following `>`, trimmed.
fn bracketed_target(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('<')?;
    let (inner, _) = rest.split_once('>')?;
    let inner = inner.trim();
    (!inner.is_empty()).then_some(inner)
}
