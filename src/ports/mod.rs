use crate::application::Analysis;
use crate::common::ToolError;
use crate::domain::symbol_table::Address;
use std::path::Path;

pub mod dot_exporter;
pub mod payload_exporter;

/// Per-address source lookup (an `addr2line`-like collaborator).
/// Returns the collaborator's raw text output.
pub trait AddressLookup: Send + Sync {
    fn lookup(&self, address: Address) -> Result<String, ToolError>;
}

/// Provides the symbol and disassembly listings of one binary.
pub trait ListingSource {
    fn symbol_listing(&self) -> anyhow::Result<String>;
    fn disassembly_listing(&self) -> anyhow::Result<String>;
}

pub trait OutputExporter {
    fn export(&self, analysis: &Analysis, path: &Path) -> anyhow::Result<()>;
}
