use std::sync::Once;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref WATCH_RESTARTS: IntCounterVec = IntCounterVec::new(
        Opts::new("confwatch_watch_restarts", "Watch streams re-opened after a fault"),
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("confwatch_watch_events_delivered", "Change events handed to watch handlers"),
        &["key", "kind"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_HANDLER_FAULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("confwatch_watch_handler_faults", "Watch handlers that panicked"),
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("confwatch_active_watches", "Watch registrations currently supervised"),
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(WATCH_RESTARTS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(WATCH_EVENTS_DELIVERED.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(WATCH_HANDLER_FAULTS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(ACTIVE_WATCHES.clone()))
            .expect("collector can be registered");
    });
}

/// Renders the crate's custom metrics followed by the autometrics API
/// metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    let mut res = String::from_utf8(buffer).unwrap_or_default();

    res.push_str(&prometheus_exporter::encode_http_response().into_body());
    res
}
