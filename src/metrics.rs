use std::sync::LazyLock;

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, IntCounterVec,
    IntGauge, Registry,
};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static OUTGOING_REQUESTS_COUNTER: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "warp_zoom_sync_outgoing_requests",
        "Outgoing HTTP requests by destination and path",
        &["destination", "path"],
        &REGISTRY
    )
    .unwrap()
});

pub static PROFILE_UPDATES_COUNTER: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "warp_zoom_sync_profile_updates",
        "Per-profile reconciliation outcomes",
        &["outcome"],
        &REGISTRY
    )
    .unwrap()
});

pub static EXCLUDED_IPS_GAUGE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "warp_zoom_sync_excluded_ips",
        "Entries in the last applied IP list",
        &REGISTRY
    )
    .unwrap()
});
