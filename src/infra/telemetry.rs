use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub const METRIC_CACHE_WARM_MS: &str = "quire_cache_warm_ms";

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            cache::METRIC_HIT,
            Unit::Count,
            "Total number of lookups served from a ready memo entry."
        );
        describe_counter!(
            cache::METRIC_MISS,
            Unit::Count,
            "Total number of lookups that started a computation."
        );
        describe_counter!(
            cache::METRIC_COALESCED,
            Unit::Count,
            "Total number of lookups that joined an in-flight computation."
        );
        describe_counter!(
            cache::METRIC_PRODUCER_ERROR,
            Unit::Count,
            "Total number of failed memo computations."
        );
        describe_counter!(
            cache::METRIC_INVALIDATED,
            Unit::Count,
            "Total number of memo entries dropped by invalidation events."
        );
        describe_histogram!(
            METRIC_CACHE_WARM_MS,
            Unit::Milliseconds,
            "Cache warm phase latency in milliseconds."
        );
    });
}
