use crate::infrastructure::toolchain::Toolchain;
use crate::ports::ListingSource;
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Read a pre-captured listing. Large `objdump` dumps are memory-mapped
/// rather than copied through a read buffer.
pub fn load_listing(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open listing {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat listing {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(String::new());
    }
    // SAFETY: the map is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map listing {}", path.display()))?;
    Ok(String::from_utf8_lossy(&mmap).into_owned())
}

/// Listings for one binary: from files when given, otherwise from the toolchain.
pub struct BinaryListings<'a> {
    pub toolchain: &'a Toolchain,
    pub binary: PathBuf,
    pub symbols_file: Option<PathBuf>,
    pub disassembly_file: Option<PathBuf>,
}

impl<'a> ListingSource for BinaryListings<'a> {
    fn symbol_listing(&self) -> Result<String> {
        match &self.symbols_file {
            Some(path) => load_listing(path),
            None => Ok(self.toolchain.symbol_listing(&self.binary)?),
        }
    }

    fn disassembly_listing(&self) -> Result<String> {
        match &self.disassembly_file {
            Some(path) => load_listing(path),
            None => Ok(self.toolchain.disassembly(&self.binary)?),
        }
    }
}
