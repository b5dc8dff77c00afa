//! # Profiling Guide
//!
//! The world and the system manager emit `tracing` events at all times
//! (`debug!` for archetype creation, system registration and entity
//! destruction; `warn!`/`error!` for failing handlers and systems). With the
//! `profiling` feature they additionally open `info_span!`s around world
//! mutations, query caching, frames and every system hook.
//!
//! Enable the feature in your Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! strata_ecs = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! and install a subscriber once at startup:
//!
//! ```ignore
//! strata_ecs::profiling::init_tracing();
//! ```
//!
//! `RUST_LOG` controls the filter, e.g. `RUST_LOG=strata_ecs=debug`.
//! Profile in release mode for accurate timings.

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false if another global subscriber was already set.
#[cfg(feature = "profiling")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter, Registry};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

#[cfg(all(test, feature = "profiling"))]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_rejected() {
        init_tracing();
        assert!(!init_tracing());
    }
}
