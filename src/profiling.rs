//! Tracing-span helpers for per-system instrumentation, gated by the
//! `profiling` feature. `SystemProfiler`/`SystemStats` in [`crate::executor`]
//! stay the canonical timing source; this module only wires those timings
//! (and a few world-shape counters) into `tracing` spans for external
//! collection.

use crate::world::World;

/// Opens an `info_span!` tagged with the system's name and the world's
/// current entity/archetype counts, entered for the lifetime of the guard.
#[cfg(feature = "profiling")]
pub fn system_span(name: &'static str, world: &World) -> tracing::span::EnteredSpan {
    tracing::info_span!(
        "system",
        system = name,
        entity_count = world.entity_count(),
        archetype_count = world.archetype_count(),
    )
    .entered()
}

#[cfg(not(feature = "profiling"))]
pub fn system_span(_name: &'static str, _world: &World) {}

/// Emits an `info!` line with a system's recorded timings, intended to be
/// called once per frame per system from whatever drives the executor.
#[cfg(feature = "profiling")]
pub fn log_system_stats(name: &'static str, stats: &crate::executor::SystemStats) {
    tracing::info!(
        system = name,
        min_ns = stats.min.as_nanos() as u64,
        max_ns = stats.max.as_nanos() as u64,
        avg_ns = stats.avg.as_nanos() as u64,
        call_count = stats.call_count,
        "system timing"
    );
}

#[cfg(not(feature = "profiling"))]
pub fn log_system_stats(_name: &'static str, _stats: &crate::executor::SystemStats) {}

/// Installs a global `tracing` subscriber that prints formatted spans to
/// stdout, honoring `RUST_LOG`. Intended for binaries/examples, not tests.
#[cfg(feature = "profiling")]
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env());

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(not(feature = "profiling"))]
pub fn init_tracing() {}

#[cfg(all(test, feature = "profiling"))]
mod tests {
    use super::*;

    #[test]
    fn system_span_enters_and_exits_without_panicking() {
        let world = World::new();
        let _guard = system_span("test_system", &world);
    }
}
