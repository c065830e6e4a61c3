//! Step metadata attached to a replay.
//!
//! A steps document comes in one of three known shapes; anything else is
//! kept verbatim as [`StepsDocument::Unrecognized`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single annotated step. Only `funcs` is interpreted; everything else
/// travels through to the client untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Call graph nodes this step highlights.
    #[serde(rename = "funcs", alias = "functions", default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub id: String,
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `{"steps": [...], "source_of_truth": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabBody {
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepsDocument {
    /// `{"tabs": [{"id": "keygen", "steps": [...]}]}`
    Tabs { tabs: Vec<Tab> },
    /// `{"tab": "keygen", "steps": [...]}`
    Single { tab: String, steps: Vec<Step> },
    /// `{"keygen": {"steps": [...]}, "encaps": {...}}`
    Keyed(BTreeMap<String, TabBody>),
    Unrecognized(serde_json::Value),
}

impl StepsDocument {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn from_value(value: &serde_json::Value) -> Self {
        Self::deserialize(value).unwrap_or_else(|_| StepsDocument::Unrecognized(value.clone()))
    }

    pub fn steps_for_tab(&self, tab_id: &str) -> &[Step] {
        match self {
            StepsDocument::Tabs { tabs } => tabs
                .iter()
                .find(|t| t.id == tab_id)
                .map(|t| t.steps.as_slice())
                .unwrap_or_default(),
            StepsDocument::Single { tab, steps } if tab == tab_id => steps.as_slice(),
            StepsDocument::Keyed(map) => map
                .get(tab_id)
                .map(|body| body.steps.as_slice())
                .unwrap_or_default(),
            _ => &[],
        }
    }

    pub fn tab_ids(&self) -> Vec<&str> {
        match self {
            StepsDocument::Tabs { tabs } => tabs.iter().map(|t| t.id.as_str()).collect(),
            StepsDocument::Single { tab, .. } => vec![tab.as_str()],
            StepsDocument::Keyed(map) => map.keys().map(String::as_str).collect(),
            StepsDocument::Unrecognized(_) => Vec::new(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, StepsDocument::Unrecognized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabs_shape() {
        let doc = StepsDocument::from_json(
            r#"{"tabs":[{"id":"keygen","steps":[{"id":1,"title":"Sample seed","funcs":["randombytes"]}]}]}"#,
        )
        .unwrap();
        assert!(matches!(doc, StepsDocument::Tabs { .. }));
        let steps = doc.steps_for_tab("keygen");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].functions, vec!["randombytes"]);
        assert!(doc.steps_for_tab("encaps").is_empty());
    }

    #[test]
    fn test_single_shape() {
        let doc = StepsDocument::from_json(r#"{"tab":"encaps","steps":[{"title":"x","vars":[]}]}"#).unwrap();
        assert!(matches!(doc, StepsDocument::Single { .. }));
        assert_eq!(doc.steps_for_tab("encaps").len(), 1);
        assert!(doc.steps_for_tab("encaps")[0].extra.contains_key("vars"));
        assert!(doc.steps_for_tab("keygen").is_empty());
    }

    #[test]
    fn test_keyed_shape() {
        let doc = StepsDocument::from_json(r#"{"keygen":{"steps":[]},"decaps":{"steps":[{}]}}"#).unwrap();
        assert!(matches!(doc, StepsDocument::Keyed(_)));
        assert_eq!(doc.tab_ids(), vec!["decaps", "keygen"]);
        assert_eq!(doc.steps_for_tab("decaps").len(), 1);
    }

    #[test]
    fn test_generated_keygen_document() {
        let doc = StepsDocument::from_json(
            r#"{"keygen":{"steps":[{"id":"kg01_seed","title":"1. Seed","funcs":["randombytes"],"role":"seed"}],"source_of_truth":"docs/keygen/*.md"}}"#,
        )
        .unwrap();
        let steps = doc.steps_for_tab("keygen");
        assert_eq!(steps[0].functions, vec!["randombytes"]);
        assert_eq!(steps[0].extra["role"], "seed");
    }

    #[test]
    fn test_legacy_functions_field_is_accepted() {
        let doc = StepsDocument::from_json(r#"{"tab":"kem","steps":[{"functions":["keypair"]}]}"#).unwrap();
        assert_eq!(doc.steps_for_tab("kem")[0].functions, vec!["keypair"]);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["steps"][0]["funcs"], serde_json::json!(["keypair"]));
    }

    #[test]
    fn test_tab_level_fields_survive_reserialization() {
        let original = serde_json::json!({
            "keygen": {"steps": [{"funcs": ["f"]}], "source_of_truth": "docs"}
        });
        let doc = StepsDocument::from_value(&original);
        assert!(doc.is_recognized());
        assert_eq!(serde_json::to_value(&doc).unwrap(), original);
    }

    #[test]
    fn test_unrecognized_shape() {
        let doc = StepsDocument::from_json(r#"{"something":"else"}"#).unwrap();
        assert!(!doc.is_recognized());
        assert!(doc.steps_for_tab("keygen").is_empty());
        let doc = StepsDocument::from_json("[1,2,3]").unwrap();
        assert!(!doc.is_recognized());
        assert!(!StepsDocument::from_value(&serde_json::json!(42)).is_recognized());
    }
}
