use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON fmt layer, generic over the subscriber it lands on. Each branch of
/// `init_tracing` builds a differently-typed stack, so the layer must be
/// constructed fresh per branch rather than bound once.
fn json_fmt_layer<S>() -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>> {
    tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .json()
        .flatten_event(true)
}

/// Initialize the tracing subscriber: EnvFilter + JSON fmt layer, with an
/// OTLP export layer when an endpoint is configured.
///
/// Pass an empty `otlp_endpoint` to log locally only (tests, dev boxes
/// without a collector).
pub fn init_tracing(service_name: &str, log_level: &str, otlp_endpoint: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if otlp_endpoint.is_empty() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_fmt_layer())
            .init();
        return;
    }

    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(otlp_endpoint);

    let pipeline = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
        ])))
        .install_batch(runtime::Tokio);

    match pipeline {
        Ok(tracer) => {
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(telemetry)
                .with(json_fmt_layer())
                .init();
        }
        Err(e) => {
            eprintln!(
                "Failed to initialize OTLP tracer for service '{}' at endpoint '{}': {}; logging locally only",
                service_name, otlp_endpoint, e
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_fmt_layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercises the collector-less branch end to end; the OTLP branch stacks
    // the same fmt layer on a differently-typed subscriber, which is why the
    // layer is built by a generic helper.
    #[test]
    fn init_without_collector_installs_local_subscriber() {
        init_tracing("core-test", "info", "");
        tracing::info!("subscriber installed");
    }
}
