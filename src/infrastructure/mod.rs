// Infrastructure for callreplay: collaborator processes, caches, config, threads.

pub mod concurrency;
pub mod config;
pub mod listing_loader;
pub mod location_cache;
pub mod playback;
pub mod toolchain;
