/// Concurrency management for callreplay.
/// Sizes the worker pool used for per-address source resolution.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use tracing::info;

/// Half the available cores, minimum 1 worker.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get() / 2)
}

/// Build a dedicated pool for address resolution. `jobs <= 1` means resolve
/// sequentially on the calling thread, so no pool is built.
pub fn build_resolver_pool(jobs: usize) -> Result<Option<ThreadPool>> {
    if jobs <= 1 {
        return Ok(None);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("callreplay-resolve-{}", i))
        .build()
        .context("Failed to build resolver thread pool")?;

    info!(
        workers = jobs,
        cores = num_cpus::get(),
        "initialized resolver pool"
    );
    Ok(Some(pool))
}
