//! Analyzer configuration, optionally loaded from a TOML file.
//!
//! ```toml
//! [tools]
//! nm = "riscv32-unknown-elf-nm"
//! timeout_ms = 5000
//!
//! [disassembly]
//! call_mnemonics = ["jal"]
//!
//! [classification]
//! implementation_dirs = ["crypto_kem", "kyber768", "kyber768r1"]
//! harness_dir = "mupq"
//!
//! [analysis]
//! root_func = "main"
//! ```

use crate::domain::location::ClassificationRules;
use crate::infrastructure::concurrency::default_workers;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub tools: ToolsConfig,
    pub disassembly: DisassemblyConfig,
    pub classification: ClassificationRules,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub nm: String,
    pub objdump: String,
    pub addr2line: String,
    /// Upper bound for each collaborator invocation.
    pub timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            nm: "riscv32-unknown-elf-nm".to_string(),
            objdump: "riscv32-unknown-elf-objdump".to_string(),
            addr2line: "riscv32-unknown-elf-addr2line".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisassemblyConfig {
    pub call_mnemonics: Vec<String>,
}

impl Default for DisassemblyConfig {
    fn default() -> Self {
        Self {
            call_mnemonics: vec!["jal".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub root_func: String,
    /// Worker threads for address resolution.
    pub jobs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            root_func: "main".to_string(),
            jobs: default_workers(),
        }
    }
}

impl AnalyzerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid analyzer configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}
