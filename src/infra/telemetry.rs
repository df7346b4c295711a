use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "cartolina_queue_depth",
            Unit::Count,
            "Number of accepted tasks not yet dispatched."
        );
        describe_counter!(
            "cartolina_tasks_completed_total",
            Unit::Count,
            "Total number of tasks whose pipeline completed."
        );
        describe_counter!(
            "cartolina_tasks_failed_total",
            Unit::Count,
            "Total number of tasks recorded as failed."
        );
        describe_counter!(
            "cartolina_queue_compactions_total",
            Unit::Count,
            "Total number of queue buffer compactions."
        );
        describe_counter!(
            "cartolina_storage_fallback_total",
            Unit::Count,
            "Total number of uploads redirected to the fallback bucket."
        );
        describe_histogram!(
            "cartolina_task_ms",
            Unit::Milliseconds,
            "End-to-end task pipeline latency in milliseconds."
        );
        describe_histogram!(
            "cartolina_render_ms",
            Unit::Milliseconds,
            "Headless render latency in milliseconds."
        );
        describe_histogram!(
            "cartolina_upload_ms",
            Unit::Milliseconds,
            "Artifact upload latency in milliseconds."
        );
    });
}
