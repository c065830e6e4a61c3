//! Call Graph DOT Exporter
//!
//! Exports an [`Analysis`] as Graphviz DOT: one cluster per module tag, the
//! binary as an entry node, and one `edge_<index>` per replay timeline entry.

use crate::application::Analysis;
use crate::domain::location::ModuleTag;
use crate::ports::OutputExporter;
use anyhow::{Context, Result};
use std::path::Path;

pub struct DotExporter;

impl DotExporter {
    pub fn to_dot(analysis: &Analysis) -> String {
        let mut lines = Vec::new();

        lines.push("digraph CallGraph {".to_string());
        lines.push("    rankdir=LR;".to_string());
        lines.push("    node [fontname=\"Helvetica\", fontsize=10];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=9];".to_string());
        lines.push(String::new());

        let binary = Self::escape_label(&analysis.binary_name);
        lines.push(format!(
            "    \"{}\" [shape=doublecircle, style=filled, fillcolor=\"#ffe4b5\"];",
            binary
        ));
        if analysis.traversal.is_some() {
            lines.push(format!(
                "    \"{}\" -> \"{}\" [style=bold];",
                binary,
                Self::escape_label(&analysis.root)
            ));
        }
        lines.push(String::new());

        for tag in ModuleTag::ALL {
            let members: Vec<&String> = analysis
                .nodes
                .iter()
                .filter(|(_, info)| info.module == tag)
                .map(|(name, _)| name)
                .collect();
            if members.is_empty() {
                continue;
            }

            lines.push(format!("    subgraph cluster_{} {{", tag.id()));
            lines.push(format!("        label=\"{}\";", tag.label()));
            lines.push("        style=rounded;".to_string());
            for name in members {
                let (shape, style, fill) = Self::node_style(tag);
                let label = format!("{}\n{}", name, analysis.display_path(name));
                lines.push(format!(
                    "        \"{}\" [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\"];",
                    Self::escape_label(name),
                    Self::escape_label(&label),
                    shape,
                    style,
                    fill
                ));
            }
            lines.push("    }".to_string());
        }

        lines.push(String::new());

        for event in &analysis.timeline {
            lines.push(format!(
                "    \"{}\" -> \"{}\" [id=\"edge_{}\"];",
                Self::escape_label(&event.caller),
                Self::escape_label(&event.callee),
                event.index
            ));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn node_style(tag: ModuleTag) -> (&'static str, &'static str, &'static str) {
        if tag.is_project() {
            ("box", "filled", "lightgray")
        } else {
            ("ellipse", "dotted", "white")
        }
    }

    fn escape_label(label: &str) -> String {
        label
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}

impl OutputExporter for DotExporter {
    fn export(&self, analysis: &Analysis, path: &Path) -> Result<()> {
        std::fs::write(path, Self::to_dot(analysis))
            .with_context(|| format!("Failed to write DOT file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NodeInfo;
    use crate::domain::callgraph::CallGraph;
    use crate::domain::location::SourceLocation;
    use crate::domain::replay::edge_sequence;
    use crate::domain::symbol_table::{Address, SymbolTable};
    use crate::domain::traversal::traverse;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn analysis() -> Analysis {
        let graph: CallGraph = [("main", "crypto_kem_keypair"), ("main", "memcpy")]
            .into_iter()
            .collect();
        let record = traverse(&graph, "main");
        let timeline = edge_sequence(&graph, &record);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "main".to_string(),
            NodeInfo {
                address: Some(Address(0x100)),
                location: SourceLocation {
                    file: "/proj/mupq/common/test.c".to_string(),
                    line: 12,
                },
                module: ModuleTag::Harness,
                alias_of: None,
            },
        );
        nodes.insert(
            "crypto_kem_keypair".to_string(),
            NodeInfo {
                address: Some(Address(0x200)),
                location: SourceLocation {
                    file: "/proj/crypto_kem/kem.c".to_string(),
                    line: 40,
                },
                module: ModuleTag::Implementation,
                alias_of: None,
            },
        );
        nodes.insert(
            "memcpy".to_string(),
            NodeInfo {
                address: None,
                location: SourceLocation::unknown(),
                module: ModuleTag::External,
                alias_of: None,
            },
        );
        Analysis {
            binary_name: "kem.elf".to_string(),
            root: "main".to_string(),
            project_root: PathBuf::from("/proj"),
            symbols: SymbolTable::default(),
            graph,
            traversal: Some(record),
            timeline,
            nodes,
        }
    }

    #[test]
    fn test_to_dot() {
        let dot = DotExporter::to_dot(&analysis());
        assert!(dot.starts_with("digraph CallGraph {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("\"kem.elf\" [shape=doublecircle"));
        assert!(dot.contains("\"kem.elf\" -> \"main\""));
        assert!(dot.contains("subgraph cluster_impl"));
        assert!(dot.contains("subgraph cluster_harness"));
        assert!(dot.contains("subgraph cluster_external"));
        assert!(!dot.contains("cluster_hal"));
        assert!(dot.contains("label=\"crypto_kem_keypair\\ncrypto_kem/kem.c:40\""));
        assert!(dot.contains("label=\"memcpy\\n??\", shape=ellipse, style=\"dotted\""));
        assert!(dot.contains("\"main\" -> \"crypto_kem_keypair\" [id=\"edge_0\"];"));
        assert!(dot.contains("\"main\" -> \"memcpy\" [id=\"edge_1\"];"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_missing_root_has_no_entry_edge() {
        let mut analysis = analysis();
        analysis.traversal = None;
        analysis.timeline.clear();
        analysis.nodes.clear();
        let dot = DotExporter::to_dot(&analysis);
        assert!(dot.contains("doublecircle"));
        assert!(!dot.contains("->"));
        assert!(!dot.contains("subgraph"));
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.dot");
        DotExporter.export(&analysis(), &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("edge_1"));
    }
}
