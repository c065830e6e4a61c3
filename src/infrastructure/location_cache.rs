/// Address -> source location resolution for one analysis run.
///
/// `LocationResolver` performs exactly one collaborator lookup per call;
/// `LocationCache` sits on top and guarantees no address is looked up twice.

use crate::domain::location::{parse_location_output, SourceLocation};
use crate::domain::symbol_table::Address;
use crate::ports::AddressLookup;
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub struct LocationResolver<'a> {
    lookup: &'a dyn AddressLookup,
}

impl<'a> LocationResolver<'a> {
    pub fn new(lookup: &'a dyn AddressLookup) -> Self {
        Self { lookup }
    }

    /// Resolve `address`, degrading every collaborator failure to
    /// [`SourceLocation::unknown`].
    pub fn resolve(&self, address: Address) -> SourceLocation {
        match self.lookup.lookup(address) {
            Ok(output) => parse_location_output(&output),
            Err(e) => {
                warn!(%address, error = %e, "address resolution failed");
                SourceLocation::unknown()
            }
        }
    }
}

pub struct LocationCache<'a> {
    resolver: LocationResolver<'a>,
    entries: DashMap<Address, SourceLocation>,
}

impl<'a> LocationCache<'a> {
    pub fn new(lookup: &'a dyn AddressLookup) -> Self {
        Self {
            resolver: LocationResolver::new(lookup),
            entries: DashMap::new(),
        }
    }

    pub fn get_or_resolve(&self, address: Address) -> SourceLocation {
        self.entries
            .entry(address)
            .or_insert_with(|| self.resolver.resolve(address))
            .clone()
    }

    /// Resolve every distinct uncached address, in parallel on `pool` when given.
    pub fn resolve_all<I>(&self, addresses: I, pool: Option<&ThreadPool>)
    where
        I: IntoIterator<Item = Address>,
    {
        let missing: Vec<Address> = addresses
            .into_iter()
            .filter(|a| !self.entries.contains_key(a))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(count = missing.len(), "resolving source locations");

        let resolve = || -> Vec<(Address, SourceLocation)> {
            missing
                .par_iter()
                .map(|&a| (a, self.resolver.resolve(a)))
                .collect()
        };
        let resolved = match pool {
            Some(pool) => pool.install(resolve),
            None => missing
                .iter()
                .map(|&a| (a, self.resolver.resolve(a)))
                .collect(),
        };

        for (address, location) in resolved {
            self.entries.insert(address, location);
        }
    }

    pub fn get(&self, address: Address) -> Option<SourceLocation> {
        self.entries.get(&address).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ToolError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Counts lookups per address.
    #[derive(Default)]
    struct CountingLookup {
        calls: Mutex<HashMap<Address, usize>>,
    }

    impl AddressLookup for CountingLookup {
        fn lookup(&self, address: Address) -> Result<String, ToolError> {
            *self.calls.lock().unwrap().entry(address).or_default() += 1;
            if address.0 == 0xdead {
                return Err(ToolError::Failed {
                    tool: "addr2line".to_string(),
                    code: Some(1),
                    stderr: String::new(),
                });
            }
            Ok(format!("fn_{:x}\n/proj/src/f{:x}.c:{}\n", address.0, address.0, address.0))
        }
    }

    #[test]
    fn test_resolver_degrades_failures() {
        let lookup = CountingLookup::default();
        let resolver = LocationResolver::new(&lookup);
        assert_eq!(resolver.resolve(Address(0xdead)), SourceLocation::unknown());
        assert_eq!(resolver.resolve(Address(0x10)).line, 16);
    }

    #[test]
    fn test_each_address_resolved_once() {
        let lookup = CountingLookup::default();
        let cache = LocationCache::new(&lookup);
        let addrs = [Address(1), Address(2), Address(1), Address(3), Address(2)];
        cache.resolve_all(addrs, None);
        cache.resolve_all(addrs, None);
        for a in addrs {
            cache.get_or_resolve(a);
        }
        let calls = lookup.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.values().all(|&n| n == 1));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_parallel_resolution_on_pool() {
        let lookup = CountingLookup::default();
        let cache = LocationCache::new(&lookup);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        cache.resolve_all((0..200u64).map(Address).chain((0..200u64).map(Address)), Some(&pool));
        let calls = lookup.calls.lock().unwrap();
        assert_eq!(calls.len(), 200);
        assert!(calls.values().all(|&n| n == 1));
        assert_eq!(cache.get(Address(7)).unwrap().file, "/proj/src/f7.c");
    }
}
