//! Global `tracing` subscriber setup (SPEC_FULL §1.1). Honors
//! `--verbose`, `RUST_LOG`, and `--log-format json`, matching the
//! teacher's per-subsystem `tracing` + `tracing-subscriber` idiom.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub fn init(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => {
            registry.with(fmt::layer().with_target(false)).init();
        }
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_target(false)).init();
        }
    }
}
