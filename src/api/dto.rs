use crate::application::Analysis;
use crate::domain::location::ModuleTag;
use crate::domain::replay::{EdgeEvent, ReplaySession};
use crate::domain::steps::StepsDocument;
use crate::domain::trace::{parse_trace_log, TraceStep};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Everything a replay client needs, written once by `analyze` and loaded by `serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub binary: String,
    pub root: String,
    pub edges: Vec<EdgeDto>,
    pub symbols: Vec<SymbolDto>,
    /// Step metadata, embedded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<serde_json::Value>,
    /// Steps recovered from a runtime trace log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceStep>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDto {
    pub index: usize,
    pub caller: String,
    pub callee: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDto {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub path: String,
    pub module: ModuleTag,
    /// Canonical name at this address when `name` is an alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl From<&EdgeEvent> for EdgeDto {
    fn from(event: &EdgeEvent) -> Self {
        EdgeDto {
            index: event.index,
            caller: event.caller.clone(),
            callee: event.callee.clone(),
            key: event.key(),
        }
    }
}

impl From<&Analysis> for ReplayPayload {
    fn from(analysis: &Analysis) -> Self {
        let symbols = analysis
            .traversal
            .iter()
            .flat_map(|record| {
                record.order.iter().map(move |name| SymbolDto {
                    name: name.clone(),
                    address: analysis
                        .node(name)
                        .and_then(|n| n.address)
                        .map(|a| a.to_string()),
                    path: analysis.display_path(name),
                    module: analysis
                        .node(name)
                        .map(|n| n.module)
                        .unwrap_or(ModuleTag::External),
                    alias_of: analysis.node(name).and_then(|n| n.alias_of.clone()),
                    depth: record.depth.get(name).copied(),
                    parent: record.parent.get(name).cloned(),
                })
            })
            .collect();

        ReplayPayload {
            binary: analysis.binary_name.clone(),
            root: analysis.root.clone(),
            edges: analysis.timeline.iter().map(EdgeDto::from).collect(),
            symbols,
            steps: None,
            trace: None,
        }
    }
}

impl ReplayPayload {
    pub fn with_steps(mut self, steps: Option<serde_json::Value>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_trace(mut self, trace: Option<Vec<TraceStep>>) -> Self {
        self.trace = trace;
        self
    }

    /// Rebuild a session; edges are re-indexed by position.
    pub fn into_session(&self) -> ReplaySession {
        let timeline = self
            .edges
            .iter()
            .enumerate()
            .map(|(index, e)| EdgeEvent {
                index,
                caller: e.caller.clone(),
                callee: e.callee.clone(),
            })
            .collect();
        let nodes = self.symbols.iter().map(|s| s.name.clone()).collect();
        ReplaySession::new(nodes, timeline)
    }

    pub fn steps_document(&self) -> Option<StepsDocument> {
        self.steps.as_ref().map(StepsDocument::from_value)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay payload {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid replay payload {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write replay payload {}", path.display()))
    }
}

/// Read a steps file. The JSON is returned exactly as written; its shape is
/// only checked so that an unexpected layout gets logged.
pub fn load_steps(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read steps file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in steps file {}", path.display()))?;
    let document = StepsDocument::from_value(&value);
    if document.is_recognized() {
        info!(tabs = ?document.tab_ids(), "loaded step metadata");
    } else {
        warn!(path = %path.display(), "steps file has an unrecognized shape; embedding verbatim");
    }
    Ok(value)
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceStep>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read trace log {}", path.display()))?;
    let steps = parse_trace_log(&String::from_utf8_lossy(&bytes));
    info!(steps = steps.len(), "loaded trace log");
    Ok(steps)
}
