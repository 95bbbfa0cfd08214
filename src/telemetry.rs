use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Initialize structured logging.
///
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`).
/// - `fmt` layer, compact for terminals or JSON for log shippers.
pub fn init(format: LogFormat) {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_session_relay=debug"));

    let registry = tracing_subscriber::registry().with(filter_layer);

    match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true),
            )
            .init(),
    }
}
