// Analysis pipeline: listings -> symbols + call graph -> traversal -> labelled replay.

use crate::domain::callgraph::{CallGraph, DisassemblyParser};
use crate::domain::location::{ClassificationRules, ModuleTag, SourceLocation};
use crate::domain::replay::{edge_sequence, EdgeEvent, ReplaySession};
use crate::domain::symbol_table::{Address, SymbolTable};
use crate::domain::traversal::{traverse_from_root, CallTree, TraversalRecord, TreeLabel};
use crate::infrastructure::location_cache::LocationCache;
use crate::ports::{AddressLookup, ListingSource};
use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Labelling data for one reached node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub address: Option<Address>,
    pub location: SourceLocation,
    pub module: ModuleTag,
    /// Canonical name at `address` when this name is an alias of it.
    pub alias_of: Option<String>,
}

/// Everything one analysis run produces.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub binary_name: String,
    pub root: String,
    pub project_root: PathBuf,
    pub symbols: SymbolTable,
    pub graph: CallGraph,
    /// `None` when the root symbol is unknown.
    pub traversal: Option<TraversalRecord>,
    pub timeline: Vec<EdgeEvent>,
    pub nodes: BTreeMap<String, NodeInfo>,
}

impl Analysis {
    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    /// `relative/path.c:line`, or `??` when unresolved.
    pub fn display_path(&self, name: &str) -> String {
        self.node(name)
            .map(|n| n.location.display_path(&self.project_root))
            .unwrap_or_else(|| "??".to_string())
    }

    pub fn call_tree(&self) -> Option<String> {
        let record = self.traversal.as_ref()?;
        Some(CallTree::new(record).render(|name| {
            let info = self.node(name);
            TreeLabel {
                is_project: info.is_some_and(|n| n.module.is_project()),
                location: info
                    .filter(|n| !n.location.is_unknown())
                    .map(|n| format!("{}:{}", n.location.file, n.location.line)),
            }
        }))
    }

    pub fn session(&self) -> ReplaySession {
        let nodes = self
            .traversal
            .as_ref()
            .map(|t| t.order.clone())
            .unwrap_or_default();
        ReplaySession::new(nodes, self.timeline.clone())
    }
}

pub struct AnalyzeUsecase<'a> {
    pub listings: &'a dyn ListingSource,
    pub lookup: &'a dyn AddressLookup,
    pub parser: DisassemblyParser,
    pub rules: ClassificationRules,
    pub pool: Option<&'a ThreadPool>,
}

impl<'a> AnalyzeUsecase<'a> {
    /// Run the pipeline. A relative `project_root` is resolved against the
    /// working directory first.
    pub fn run(&self, binary_name: &str, root: &str, project_root: PathBuf) -> Result<Analysis> {
        let project_root = std::path::absolute(&project_root).with_context(|| {
            format!("Failed to resolve project root {}", project_root.display())
        })?;
        let symbols = SymbolTable::parse(
            &self
                .listings
                .symbol_listing()
                .context("Failed to obtain symbol listing")?,
        );
        let graph = self.parser.parse(
            &self
                .listings
                .disassembly_listing()
                .context("Failed to obtain disassembly listing")?,
        );
        info!(
            symbols = symbols.len(),
            functions = graph.adjacency().len(),
            edges = graph.edge_count(),
            "parsed listings"
        );

        let traversal = traverse_from_root(&graph, &symbols, root);
        let (timeline, nodes) = match &traversal {
            Some(record) => {
                let timeline = edge_sequence(&graph, record);
                let nodes = self.label_nodes(&symbols, record, &project_root);
                info!(reached = record.len(), timeline = timeline.len(), "traversal complete");
                (timeline, nodes)
            }
            None => {
                warn!(root, "root symbol not found; traversal is empty");
                (Vec::new(), BTreeMap::new())
            }
        };

        Ok(Analysis {
            binary_name: binary_name.to_string(),
            root: root.to_string(),
            project_root,
            symbols,
            graph,
            traversal,
            timeline,
            nodes,
        })
    }

    fn label_nodes(
        &self,
        symbols: &SymbolTable,
        record: &TraversalRecord,
        project_root: &std::path::Path,
    ) -> BTreeMap<String, NodeInfo> {
        let cache = LocationCache::new(self.lookup);
        cache.resolve_all(
            record.order.iter().filter_map(|name| symbols.address_of(name)),
            self.pool,
        );

        record
            .order
            .iter()
            .map(|name| {
                let address = symbols.address_of(name);
                let location = address
                    .map(|a| cache.get_or_resolve(a))
                    .unwrap_or_else(SourceLocation::unknown);
                let module = self.rules.module_of(&location, project_root);
                let alias_of = address
                    .and_then(|a| symbols.name_at(a))
                    .filter(|canonical| *canonical != name.as_str())
                    .map(str::to_string);
                (
                    name.clone(),
                    NodeInfo {
                        address,
                        location,
                        module,
                        alias_of,
                    },
                )
            })
            .collect()
    }
}
