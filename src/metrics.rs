use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, register_int_counter, register_int_gauge};


lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounter =
        register_int_counter!("admission_requests_total", "Total number of requests seen by the admission check").unwrap();
    pub static ref REJECTED_TOTAL: IntCounter =
        register_int_counter!("admission_rejected_total", "Requests rejected with 429").unwrap();
    pub static ref ALLOW_LISTED_TOTAL: IntCounter =
        register_int_counter!("admission_allow_listed_total", "Requests admitted through the allow-list").unwrap();
    pub static ref STORE_EVICTIONS: IntCounter =
        register_int_counter!("admission_store_evictions_total", "Counter records evicted for capacity").unwrap();
    pub static ref STORE_ENTRIES: IntGauge =
        register_int_gauge!("admission_store_entries", "Counter records currently tracked").unwrap();
}
