//! Shared utilities: configuration and tracing setup.

pub mod config;

pub use config::{
    ChunkingConfig, CoreConfig, EmbeddingConfig, GenerationConfig, IngestConfig, RetrievalConfig,
    VendorConfig,
};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` for this crate. Set
/// `LOG_FORMAT=json` for structured output. One-shot: the subscriber can
/// only be installed once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("medquery=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
