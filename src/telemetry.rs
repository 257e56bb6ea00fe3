//! Tracing setup for binaries, demos, and tests.
//!
//! The library itself only *emits* `tracing` events; installing a
//! subscriber is the embedding application's call. [`init_tracing`] is the
//! standard recipe: `.env` loading via `dotenvy`, an [`EnvFilter`] honoring
//! `RUST_LOG` with a quiet default, and a compact fmt layer on stderr.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default subscriber. Safe to call more than once: later
/// calls are no-ops.
pub fn init_tracing() {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,neurograph=info"))
        .unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init();
}
