//! Prometheus metrics recorder and `/metrics` rendering.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once, before any metric is recorded. Returns the handle used to
/// render `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// HTTP requests (counter, labels: route, status).
pub const HTTP_REQUESTS_TOTAL: &str = "livetap_http_requests_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "livetap_ws_connections_total";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "livetap_ws_connection_duration_seconds";
/// Registered live subscribers (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "livetap_ws_connections_active";
/// Live messages published to the hub (counter, label: kind).
pub const HUB_MESSAGES_PUBLISHED_TOTAL: &str = "livetap_hub_messages_published_total";
/// Subscribers evicted after a failed delivery (counter).
pub const HUB_SUBSCRIBERS_DROPPED_TOTAL: &str = "livetap_hub_subscribers_dropped_total";
/// Relay bridge reconnects (counter).
pub const RELAY_RECONNECTS_TOTAL: &str = "livetap_relay_reconnects_total";

/// Count every routed request by route template and status.
pub async fn track_http_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |p| p.as_str().to_owned());
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    counter!(HTTP_REQUESTS_TOTAL, "route" => route, "status" => status).increment(1);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(WS_CONNECTIONS_TOTAL).increment(3);
        });
        assert!(handle.render().contains("livetap_ws_connections_total 3"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            HTTP_REQUESTS_TOTAL,
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            HUB_MESSAGES_PUBLISHED_TOTAL,
            HUB_SUBSCRIBERS_DROPPED_TOTAL,
            RELAY_RECONNECTS_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
