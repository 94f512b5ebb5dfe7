use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;
lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static GATEWAY_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static GATEWAY_LATENCY: OnceLock<Histogram> = OnceLock::new();
static QUIZZES_COMPLETED: OnceLock<IntCounter> = OnceLock::new();
pub fn init_metrics() -> anyhow::Result<()> {
    if GATEWAY_REQUESTS.get().is_none() {
        let counter = IntCounterVec::new(
            prometheus::opts!("gateway_requests_total", "Backend gateway calls per route and outcome"),
            &["route", "outcome"],
        )?;
        REGISTRY.register(Box::new(counter.clone())).ok();
        let _ = GATEWAY_REQUESTS.set(counter);
    }
    if GATEWAY_LATENCY.get().is_none() {
        let histogram = Histogram::with_opts(HistogramOpts::new(
            "gateway_request_seconds",
            "Backend gateway round-trip time",
        ))?;
        REGISTRY.register(Box::new(histogram.clone())).ok();
        let _ = GATEWAY_LATENCY.set(histogram);
    }
    if QUIZZES_COMPLETED.get().is_none() {
        let counter = IntCounter::new("quiz_completed_total", "Quizzes answered to the last question")?;
        REGISTRY.register(Box::new(counter.clone())).ok();
        let _ = QUIZZES_COMPLETED.set(counter);
    }
    Ok(())
}
pub fn inc_gateway_request(route: &str, outcome: &str) {
    if let Some(counter) = GATEWAY_REQUESTS.get() {
        counter.with_label_values(&[route, outcome]).inc();
    }
}
pub fn observe_gateway_latency(seconds: f64) {
    if let Some(histogram) = GATEWAY_LATENCY.get() {
        histogram.observe(seconds);
    }
}
pub fn inc_quiz_completed() {
    if let Some(counter) = QUIZZES_COMPLETED.get() {
        counter.inc();
    }
}
/// Text exposition of every registered metric.
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
