use crate::api::dto::ReplayPayload;
use crate::application::Analysis;
use crate::domain::trace::TraceStep;
use crate::ports::OutputExporter;
use anyhow::Result;
use std::path::Path;

/// Writes the JSON replay payload, optionally embedding step metadata and a
/// parsed trace log.
#[derive(Debug, Clone, Default)]
pub struct ReplayJsonExporter {
    pub steps: Option<serde_json::Value>,
    pub trace: Option<Vec<TraceStep>>,
}

impl OutputExporter for ReplayJsonExporter {
    fn export(&self, analysis: &Analysis, path: &Path) -> Result<()> {
        ReplayPayload::from(analysis)
            .with_steps(self.steps.clone())
            .with_trace(self.trace.clone())
            .save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::CallGraph;
    use crate::domain::replay::edge_sequence;
    use crate::domain::symbol_table::SymbolTable;
    use crate::domain::traversal::traverse;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_export_payload() {
        let graph: CallGraph = [("main", "a"), ("a", "b")].into_iter().collect();
        let record = traverse(&graph, "main");
        let analysis = Analysis {
            binary_name: "fw.elf".to_string(),
            root: "main".to_string(),
            project_root: PathBuf::from("/proj"),
            symbols: SymbolTable::default(),
            timeline: edge_sequence(&graph, &record),
            graph,
            traversal: Some(record),
            nodes: BTreeMap::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        ReplayJsonExporter {
            steps: Some(json!({"tabs": []})),
            trace: None,
        }
        .export(&analysis, &path)
        .unwrap();

        let payload = ReplayPayload::load(&path).unwrap();
        assert_eq!(payload.binary, "fw.elf");
        assert_eq!(payload.edges[1].key, "a->b");
        assert_eq!(payload.symbols[2].name, "b");
        assert_eq!(payload.symbols[2].depth, Some(2));
        assert_eq!(payload.symbols[2].parent.as_deref(), Some("a"));
        assert_eq!(payload.symbols[2].path, "??");
        assert_eq!(payload.steps, Some(json!({"tabs": []})));
        assert!(payload.trace.is_none());
    }
}
