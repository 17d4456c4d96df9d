use anyhow::Result;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "notifier_events_received_total",
        "Events accepted by the pipeline, labelled by freshness."
    );
    describe_counter!(
        "notifier_events_dropped_total",
        "Events dropped before reaching the reducers (malformed, unknown_variant, stale_session)."
    );
    describe_counter!(
        "notifier_notifications_total",
        "Discrete notifications appended."
    );
    describe_counter!(
        "notifier_duplicate_events_total",
        "Events ignored because their key was already present."
    );
    describe_gauge!(
        "notifier_ongoing_operations",
        "Progressions currently in flight."
    );
    describe_counter!(
        "notifier_reconnects_total",
        "Live stream reconnect attempts."
    );
    describe_counter!(
        "notifier_side_effect_failures_total",
        "Side effects that returned an error or panicked."
    );
    describe_counter!(
        "tracing_error_events",
        "ERROR-level log events."
    );
}

/// Install the global recorder and serve `/metrics` on `port`. Needs a Tokio runtime.
pub fn install_prometheus(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_handle_renders_metric_names() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            metrics::counter!("notifier_events_received_total", "fresh" => "true").increment(2);
            metrics::gauge!("notifier_ongoing_operations").set(1.0);
        });

        let rendered = handle.render();
        assert!(rendered.contains("notifier_events_received_total{fresh=\"true\"} 2"));
        assert!(rendered.contains("notifier_ongoing_operations 1"));
    }
}
