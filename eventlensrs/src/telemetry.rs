//! Log subscriber setup for binaries and demos embedding the engine.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "eventlens=info";

pub fn init_tracing() {
    init_tracing_with_filter(DEFAULT_FILTER);
}

/// Install a fmt subscriber. `RUST_LOG` wins over `filter`; a second call
/// is a no-op.
pub fn init_tracing_with_filter(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
