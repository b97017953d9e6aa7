//! Logging setup (A2 ambient): a `tracing-subscriber` `EnvFilter`-based
//! initializer, in the ancestor's own style of a thin one-shot init
//! function rather than a long-lived logging object.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset: this crate at `info`, upstream
/// crates at their own default.
const DEFAULT_FILTER: &str = "info";

/// Installs a global `tracing` subscriber honoring `RUST_LOG`, falling
/// back to [`DEFAULT_FILTER`]. Safe to call more than once; subsequent
/// calls are no-ops, matching the ancestor's own idempotent init helper.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
