//! Tracing and Sentry setup for binaries built on the store.

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, StorefrontConfig};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "vintage_storefront=info,vintage_cli=info";

/// Initialize Sentry error tracking and return guard that must be kept alive.
#[must_use]
pub fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays clean. Call after
/// [`init_sentry`] so the Sentry layer finds the client.
pub fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter));

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dsn_no_sentry() {
        let config = StorefrontConfig::memory();
        assert!(init_sentry(&config).is_none());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
