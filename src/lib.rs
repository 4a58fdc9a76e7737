pub mod breadcrumbs;
pub mod config;
pub mod context;
pub mod error;
pub mod interceptors;
pub mod logger;
pub mod pipeline;
pub mod reporting;
pub mod utils;

mod tests;

use tracing_subscriber::{EnvFilter, prelude::*};

/// Set up the process-wide `tracing` subscriber and load `.env`. Hosts that
/// own their own subscriber can skip this; repeated calls are no-ops.
pub fn telemetry_init() {
    dotenvy::dotenv().ok();

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_line_number(true)
                .with_file(true),
        )
        .try_init();
}
