use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("test".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    WRITE_OUTCOMES.with_label_values(&["update", "OK"]).inc();
    let metrics = registry.gather();
    let names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();

    assert!(names.contains(&"test_ncm_write_outcomes_total"));
}

#[test]
fn test_counter_increment() {
    let before = STALE_CANDIDATES.get();
    STALE_CANDIDATES.inc();
    assert!(STALE_CANDIDATES.get() > before);
}

#[test]
fn gather_text_renders_registered_metrics() {
    CURRENT_VERSION.set(42);
    let text = gather_text();
    assert!(text.contains("ncm_current_version"));
}

#[test]
fn version_gauge_saturates_for_huge_versions() {
    assert_eq!(version_gauge_value(10101), 10101);
    assert_eq!(version_gauge_value(i64::MAX as u64), i64::MAX);
    assert_eq!(version_gauge_value(u64::MAX), i64::MAX);
}
