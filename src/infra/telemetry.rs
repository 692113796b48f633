use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::likes::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_INVALIDATION_FAILED,
    METRIC_MUTATION, METRIC_POPULATE_SKIPPED,
};
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Like counts served from the cache tier."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Like count reads that fell through to the store."
        );
        describe_counter!(
            METRIC_CACHE_ERROR,
            Unit::Count,
            "Cache reads or populates that failed or timed out."
        );
        describe_counter!(
            METRIC_POPULATE_SKIPPED,
            Unit::Count,
            "Store counts not cached because the key was invalidated mid-read."
        );
        describe_counter!(
            METRIC_INVALIDATION_FAILED,
            Unit::Count,
            "Post-commit cache invalidations that failed."
        );
        describe_counter!(
            METRIC_MUTATION,
            Unit::Count,
            "Committed like and unlike mutations."
        );
    });
}
