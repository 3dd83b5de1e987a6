use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref INSTALLED_CONFIGS: IntCounter =
        IntCounter::new("ncm_installed_total", "Snapshots installed into the local cache")
            .expect("metric can not be created");

    pub static ref STALE_CANDIDATES: IntCounter = IntCounter::new(
        "ncm_stale_candidates_total",
        "Candidates dropped because they were not newer than the local snapshot"
    )
    .expect("metric can not be created");

    pub static ref WATCHER_FETCH_FAILURES: IntCounter = IntCounter::new(
        "ncm_watcher_fetch_failures_total",
        "Store reads performed by the change watcher that failed"
    )
    .expect("metric can not be created");

    pub static ref MALFORMED_RECORDS: IntCounter = IntCounter::new(
        "ncm_malformed_records_total",
        "Serialized records discarded because they failed to decode or validate"
    )
    .expect("metric can not be created");

    pub static ref WRITE_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("ncm_write_outcomes_total", "Completed update/overwrite calls"),
        &["op", "status"]
    )
    .expect("metric can not be created");

    pub static ref DISTRIBUTION_FAILURES: IntCounter = IntCounter::new(
        "ncm_distribution_failures_total",
        "Worker deliveries that failed or timed out"
    )
    .expect("metric can not be created");

    pub static ref CURRENT_VERSION: IntGauge =
        IntGauge::new("ncm_current_version", "Version of the installed snapshot")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(INSTALLED_CONFIGS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STALE_CANDIDATES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCHER_FETCH_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MALFORMED_RECORDS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WRITE_OUTCOMES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DISTRIBUTION_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CURRENT_VERSION.clone()))
        .expect("collector can be registered");
}

/// Gauge reading for a version; saturates instead of wrapping negative.
pub(crate) fn version_gauge_value(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

/// Renders [`REGISTRY`] in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode custom metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
