//! Logging setup
//!
//! The library only emits `tracing` events. Hosts that have no subscriber of
//! their own call [`init_tracing`] once.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter directive variable, e.g. `EMBED_AGENT_LOG=embed_agent=debug`
pub const LOG_ENV: &str = "EMBED_AGENT_LOG";
/// Set to `json` for one JSON object per line
pub const LOG_FORMAT_ENV: &str = "EMBED_AGENT_LOG_FORMAT";

const DEFAULT_FILTER: &str = "embed_agent=info";

/// Install a global subscriber writing to stderr.
///
/// Returns false if a subscriber was already installed, by this function or
/// by the host. Calling it again is harmless.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into());
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.is_ok()
}
