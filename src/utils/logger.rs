//! Logging bootstrap for hosts that do not install their own subscriber.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const ENV_LOG: &str = "FASTPATH_LOG";
const DEFAULT_FILTER: &str = "warn";

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install a fmt subscriber filtered by `FASTPATH_LOG`, then `RUST_LOG`,
/// then `warn`. Calling it again is a no-op. Returns whether this crate's
/// subscriber is the active one; `false` when the host already set another.
pub fn init_logging() -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(ENV_LOG)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .is_ok()
    })
}
