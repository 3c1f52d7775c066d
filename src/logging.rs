//! ==============================================================================
//! logging.rs - tracing subscriber setup for both roles
//! ==============================================================================
//!
//! purpose:
//!     `RUST_LOG` wins over `[logging] level` when set. `format = "json"`
//!     switches to one json object per line.
//!
//! relationships:
//!     - used by: main.rs (once, right after config load)
//!
//! ==============================================================================

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub fn init(config: &LoggingConfig) {
    let filter = filter(&config.level);
    let result = if config.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        eprintln!("[LOGGING] subscriber already set: {}", e);
    }
}

/// debug-level subscriber on the test writer; safe to call repeatedly
#[cfg(test)]
pub(crate) fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
