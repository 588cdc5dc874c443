// Prometheus metrics for the scheduler loops and click tracking, exposed
// on the service's /metrics endpoint.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};

lazy_static! {
    pub static ref POSTS_PUBLISHED: IntCounter =
        register_int_counter!("posts_published_total", "Posts published to the channel")
            .expect("metric registered once");
    pub static ref POSTS_FAILED: IntCounter =
        register_int_counter!("posts_failed_total", "Publish attempts that failed")
            .expect("metric registered once");
    pub static ref PAYMENT_REFUNDS: IntCounter =
        register_int_counter!("payment_refunds_total", "Refunded payments detected")
            .expect("metric registered once");
    pub static ref CLICKS_RECORDED: IntCounter =
        register_int_counter!("clicks_recorded_total", "Tracked link clicks recorded")
            .expect("metric registered once");
    pub static ref PUBLISH_LATENCY: Histogram = register_histogram!(
        "publish_latency_seconds",
        "Time spent publishing a single post"
    )
    .expect("metric registered once");
    pub static ref CHECK_REFUNDS_LATENCY: Histogram = register_histogram!(
        "check_refunds_latency_seconds",
        "Time spent on one refund reconciliation pass"
    )
    .expect("metric registered once");
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        POSTS_PUBLISHED.inc();
        let rendered = render();
        assert!(rendered.contains("posts_published_total"));
    }
}
