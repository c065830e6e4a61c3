//! Symbol Table
//!
//! Parses an `nm`-style symbol listing into name <-> address lookups,
//! restricted to executable symbols.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A code address, normalized so that `0x0100`, `0100` and `0X100` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Parse a hexadecimal address token, with or without a `0x` prefix and
    /// with any amount of zero padding.
    pub fn parse(token: &str) -> Option<Address> {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Symbol classification derived from the `nm` type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Defined code: `T`/`t` (text) or `W`/`w` (weak).
    Function,
    Other,
}

impl SymbolKind {
    pub fn from_type_code(code: &str) -> SymbolKind {
        match code {
            "T" | "t" | "W" | "w" => SymbolKind::Function,
            _ => SymbolKind::Other,
        }
    }
}

/// One entry of the symbol listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: Address,
    pub kind: SymbolKind,
}

impl Symbol {
    /// Parse one listing line (`<address> <type-code> <name> ...`).
    /// Returns `None` for blank or malformed lines.
    pub fn parse_line(line: &str) -> Option<Symbol> {
        let mut parts = line.split_whitespace();
        let addr = parts.next()?;
        let code = parts.next()?;
        let name = parts.next()?;
        Some(Symbol {
            name: name.to_string(),
            address: Address::parse(addr)?,
            kind: SymbolKind::from_type_code(code),
        })
    }
}

/// Static lookup of executable symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub by_name: HashMap<String, Address>,
    /// Canonical reverse map: the last name seen wins for aliased addresses.
    pub by_address: HashMap<Address, String>,
}

impl SymbolTable {
    pub fn parse(listing: &str) -> Self {
        let mut table = SymbolTable::default();
        for symbol in listing.lines().filter_map(Symbol::parse_line) {
            if symbol.kind != SymbolKind::Function {
                continue;
            }
            table.by_address.insert(symbol.address, symbol.name.clone());
            table.by_name.insert(symbol.name, symbol.address);
        }
        table
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.by_name.get(name).copied()
    }

    pub fn name_at(&self, address: Address) -> Option<&str> {
        self.by_address.get(&address).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalization() {
        assert_eq!(Address::parse("0x0100"), Address::parse("0100"));
        assert_eq!(Address::parse("00000100"), Some(Address(0x100)));
        assert_eq!(Address::parse("0X100"), Some(Address(0x100)));
        assert_eq!(Address::parse("0"), Some(Address(0)));
        assert_eq!(Address::parse("0x"), None);
        assert_eq!(Address::parse("main"), None);
        assert_eq!(Address(0x100).to_string(), "0x100");
    }

    #[test]
    fn test_keeps_only_executable_symbols() {
        let listing = "\
00001000 T main
00001000 d g_counter
00001010 t helper
00001020 W weak_fn
00001030 w weak_local
00002000 B bss_var
00002004 R rodata
";
        let table = SymbolTable::parse(listing);
        assert!(table.contains("main"));
        assert!(table.contains("helper"));
        assert!(table.contains("weak_fn"));
        assert!(table.contains("weak_local"));
        assert!(!table.contains("g_counter"));
        assert!(!table.contains("bss_var"));
        assert!(!table.contains("rodata"));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let listing = "\n   \n00001000 T\nU undefined_only\nzzzz T bogus\n00001100 T ok extra tokens\n";
        let table = SymbolTable::parse(listing);
        assert_eq!(table.len(), 1);
        assert_eq!(table.address_of("ok"), Some(Address(0x1100)));
    }

    #[test]
    fn test_alias_reverse_map_keeps_last_name() {
        let listing = "80000000 T _start\n80000000 T reset_vector\n";
        let table = SymbolTable::parse(listing);
        assert_eq!(table.address_of("_start"), Some(Address(0x8000_0000)));
        assert_eq!(table.address_of("reset_vector"), Some(Address(0x8000_0000)));
        assert_eq!(table.name_at(Address(0x8000_0000)), Some("reset_vector"));
    }

    #[test]
    fn test_padding_variants_share_a_key() {
        let table = SymbolTable::parse("0x0100 T a\n");
        assert_eq!(table.name_at(Address::parse("0100").unwrap()), Some("a"));
    }
}
