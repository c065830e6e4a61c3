//! Tracing initialization.

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter, e.g. `CALLREPLAY_LOG=callreplay=debug`.
pub const LOG_ENV: &str = "CALLREPLAY_LOG";

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// the call tree. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("callreplay=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init()
            .ok();
    });
}
