use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

use crate::Error;
use crate::Result;


lazy_static! {
    pub static ref ALERTS_RAISED: IntCounterVec = IntCounterVec::new(
        Opts::new("alerts_raised", "Alerts created, by resource partition"),
        &["resource"]
    )
    .expect("metric can not be created");

    pub static ref ALERT_ID_CAS_CONFLICTS: IntCounter = IntCounter::new(
        "alert_id_cas_conflicts",
        "Alert id compare-and-set attempts lost to a concurrent allocator"
    )
    .expect("metric can not be created");

    pub static ref WATCH_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_errors", "Delivery errors seen by alert watches"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events", "Alert events handed to watch callbacks"),
        &["action"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_ONCE: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(ALERTS_RAISED.clone()),
        Box::new(ALERT_ID_CAS_CONFLICTS.clone()),
        Box::new(WATCH_ERRORS.clone()),
        Box::new(WATCH_EVENTS.clone()),
    ];
    for c in collectors {
        if let Err(e) = registry.register(c) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

/// Text exposition of the crate registry
pub fn gather() -> Result<String> {
    REGISTER_ONCE.call_once(|| register_custom_metrics(&REGISTRY));

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::Fatal(format!("could not encode custom metrics: {e}")))?;
    String::from_utf8(buffer)
        .map_err(|e| Error::Fatal(format!("custom metrics could not be from_utf8'd: {e}")))
}
